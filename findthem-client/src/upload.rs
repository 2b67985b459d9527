//! Image selection and pre-flight validation
//!
//! Everything here runs before any network call. A failed check yields a
//! [`ValidationError`] naming the first field that needs attention.

use crate::model::CaseStatus;
use std::path::Path;
use thiserror::Error;

/// Largest accepted image (10 MiB)
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// MIME types the backend accepts
pub const ACCEPTED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/bmp"];

/// What is wrong with a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Problem {
    Required,
    InvalidImage,
    InvalidStatus,
}

impl Problem {
    fn describe(&self) -> &'static str {
        match self {
            Problem::Required => "required",
            Problem::InvalidImage => "must be a JPG, PNG, GIF or BMP image under 10MB",
            Problem::InvalidStatus => "must be 'missing' or 'found'",
        }
    }
}

/// Client-detected input error, always recoverable by correcting the input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field} {}", .problem.describe())]
pub struct ValidationError {
    pub field: &'static str,
    pub problem: Problem,
}

impl ValidationError {
    pub fn required(field: &'static str) -> Self {
        Self { field, problem: Problem::Required }
    }

    pub fn invalid_image(field: &'static str) -> Self {
        Self { field, problem: Problem::InvalidImage }
    }

    /// Short title for notifications, e.g. "Photo Required"
    pub fn title(&self) -> String {
        let mut chars = self.field.chars();
        let field = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        match self.problem {
            Problem::Required => format!("{} Required", field),
            Problem::InvalidImage => format!("Invalid {}", field),
            Problem::InvalidStatus => format!("Invalid {}", field),
        }
    }
}

/// An image picked by the user (or fetched from the uploads folder)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read an image from disk, inferring its MIME type from the extension
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let mime_type = mime_for_file_name(&file_name).to_string();
        Ok(Self { file_name, mime_type, bytes })
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Accepted MIME type and no larger than [`MAX_IMAGE_BYTES`]
    pub fn is_valid_image(&self) -> bool {
        is_valid_image(&self.mime_type, self.size())
    }
}

/// The image-validity predicate
pub fn is_valid_image(mime_type: &str, size: usize) -> bool {
    ACCEPTED_MIME_TYPES.contains(&mime_type) && size <= MAX_IMAGE_BYTES
}

/// MIME type for a file name, "application/octet-stream" when unknown
pub fn mime_for_file_name(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Raw report form input
#[derive(Debug, Clone, Default)]
pub struct CaseSubmission {
    pub name: String,
    pub status: String,
    pub description: String,
    pub contact: String,
    pub photo: Option<ImageUpload>,
}

/// A submission that passed every check
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCase {
    pub name: String,
    pub status: CaseStatus,
    pub description: String,
    pub contact: String,
    pub photo: ImageUpload,
}

impl CaseSubmission {
    /// Check fields in form order: name, status, description, contact, photo
    pub fn validate(&self) -> Result<ValidatedCase, ValidationError> {
        let name = required_text("name", &self.name)?;

        if self.status.trim().is_empty() {
            return Err(ValidationError::required("status"));
        }
        let status = self.status.parse::<CaseStatus>().map_err(|_| ValidationError {
            field: "status",
            problem: Problem::InvalidStatus,
        })?;

        let description = required_text("description", &self.description)?;
        let contact = required_text("contact", &self.contact)?;
        let photo = validate_photo(self.photo.as_ref())?;

        Ok(ValidatedCase {
            name,
            status,
            description,
            contact,
            photo,
        })
    }
}

/// A present and valid photo, copied out of the caller's selection
pub fn validate_photo(selection: Option<&ImageUpload>) -> Result<ImageUpload, ValidationError> {
    match selection {
        None => Err(ValidationError::required("photo")),
        Some(image) if !image.is_valid_image() => Err(ValidationError::invalid_image("photo")),
        Some(image) => Ok(image.clone()),
    }
}

fn required_text(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::required(field))
    } else {
        Ok(trimmed.to_string())
    }
}
