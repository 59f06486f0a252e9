use std::fmt;
use std::path::Path;
use tracing::{debug, trace, warn};

/// Extension of detection result files written by the inference program
pub const RESULT_EXTENSION: &str = "txt";

/// Extension of the frame image written next to each result file
pub const IMAGE_EXTENSION: &str = "jpg";

/// Decision on whether a result file leads to an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadDecision {
    /// Upload `image_name` and announce `num_persons`
    Upload {
        image_name: String,
        num_persons: String,
    },
    /// Drop the event
    Skip { reason: SkipReason },
}

/// Why an event was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Path is not a `.txt` result file
    NotResultFile,
    /// Result file could not be read (already deleted, permissions, ...)
    Unreadable(String),
    /// Result file is empty
    Empty,
    /// Content is not an integer count
    InvalidCount(String),
    /// Nothing was detected
    ZeroCount,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotResultFile => write!(f, "not a result file"),
            SkipReason::Unreadable(e) => write!(f, "result file unreadable: {}", e),
            SkipReason::Empty => write!(f, "result file empty"),
            SkipReason::InvalidCount(content) => write!(f, "invalid count {:?}", content),
            SkipReason::ZeroCount => write!(f, "zero detections"),
        }
    }
}

/// True if `path` names a detection result file
pub fn is_result_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == RESULT_EXTENSION)
}

/// Image file name paired with a result file: `detect_001.txt` -> `detect_001.jpg`
pub fn image_name_for(path: &Path) -> Option<String> {
    let file_name = path.file_name()?;
    let image = Path::new(file_name).with_extension(IMAGE_EXTENSION);
    image.to_str().map(String::from)
}

/// Evaluate result file content.
///
/// Returns the trimmed count text when the frame should be uploaded, which is
/// for every integer except zero.
pub fn evaluate_count(content: &str) -> Result<String, SkipReason> {
    let count_text = content.trim();

    if count_text.is_empty() {
        return Err(SkipReason::Empty);
    }

    // Any integer, signed and of any width; only zero suppresses the upload
    let digits = count_text
        .strip_prefix(|c: char| c == '+' || c == '-')
        .unwrap_or(count_text);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SkipReason::InvalidCount(count_text.to_string()));
    }

    if digits.bytes().all(|b| b == b'0') {
        return Err(SkipReason::ZeroCount);
    }

    Ok(count_text.to_string())
}

/// Read a result file and decide whether its frame gets uploaded
pub async fn evaluate(path: &Path) -> UploadDecision {
    if !is_result_file(path) {
        trace!(path = %path.display(), "Ignoring non-result file");
        return UploadDecision::Skip {
            reason: SkipReason::NotResultFile,
        };
    }

    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Result file unreadable");
            return UploadDecision::Skip {
                reason: SkipReason::Unreadable(e.to_string()),
            };
        }
    };

    debug!(path = %path.display(), content = %content.trim(), "Read result file");

    let num_persons = match evaluate_count(&content) {
        Ok(count) => count,
        Err(reason) => {
            if let SkipReason::InvalidCount(_) = reason {
                warn!(path = %path.display(), reason = %reason, "Ignoring malformed result file");
            } else {
                debug!(path = %path.display(), reason = %reason, "Skipping result file");
            }
            return UploadDecision::Skip { reason };
        }
    };

    match image_name_for(path) {
        Some(image_name) => UploadDecision::Upload {
            image_name,
            num_persons,
        },
        None => UploadDecision::Skip {
            reason: SkipReason::NotResultFile,
        },
    }
}
