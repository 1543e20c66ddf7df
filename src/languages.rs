//! Mapping from source file extensions to the shell command that runs them.

use std::path::{Path, PathBuf};

use crate::error::CommandError;

/// A file to run, derived from the active document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub file_path: PathBuf,
    pub extension: String,
}

impl RunRequest {
    /// Build a request for `path`, made absolute against the current directory
    pub fn from_path(path: &Path) -> Self {
        let file_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };
        let extension = file_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            file_path,
            extension,
        }
    }

    /// Directory the command runs in
    pub fn working_dir(&self) -> PathBuf {
        self.file_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Supported extensions, in table order
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "js", "py", "java", "c", "cpp", "cs", "go", "rb", "php", "ts", "swift", "r", "scala",
];

/// Resolve the shell command for a request.
///
/// The file path is always passed double-quoted as one argument. Compiled
/// languages chain compile and execute with `&&` so a failed compile never
/// runs a stale binary.
pub fn resolve_command(request: &RunRequest) -> Result<String, CommandError> {
    let path = request.file_path.display().to_string();
    let binary = request.file_path.with_extension("").display().to_string();
    let dir = request.working_dir().display().to_string();
    let stem = request
        .file_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let command = match request.extension.to_lowercase().as_str() {
        "js" => format!("node \"{path}\""),
        "py" => format!("python \"{path}\""),
        "java" => format!("javac \"{path}\" && java -cp \"{dir}\" {stem}"),
        "c" => format!("gcc \"{path}\" -o \"{binary}\" && \"{binary}\""),
        "cpp" => format!("g++ \"{path}\" -o \"{binary}\" && \"{binary}\""),
        "cs" => format!("dotnet run \"{path}\""),
        "go" => format!("go run \"{path}\""),
        "rb" => format!("ruby \"{path}\""),
        "php" => format!("php \"{path}\""),
        "ts" => format!("ts-node \"{path}\""),
        "swift" => format!("swift \"{path}\""),
        "r" => format!("Rscript \"{path}\""),
        "scala" => format!("scala \"{path}\""),
        _ => {
            return Err(CommandError::UnsupportedFileType {
                extension: request.extension.clone(),
            })
        }
    };

    Ok(command)
}
