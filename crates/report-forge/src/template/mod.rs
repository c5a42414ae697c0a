//! DOCX template handling: prompt excerpt, style samples and field injection

pub mod builder;
pub mod excerpt;
pub mod style;
pub mod style_reference;

pub use builder::{inject, inject_bytes};
pub use excerpt::load_template_excerpt;
pub use style::StyleLoader;
pub use style_reference::PREDEFINED_STYLE_REFERENCE_TEXT;

/// MIME type of generated reports
pub const DOCX_MEDIA_TYPE: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Attachment name of generated reports
pub const DEFAULT_REPORT_FILENAME: &str = "report.docx";
