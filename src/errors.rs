use std::io;

use thiserror::Error;

/// Errors that can occur when building, serializing, revising or
/// parsing a document. All fallible public operations return
/// `Result<_, PdfError>`; there is no panicking path in the library.
#[derive(Debug, Error)]
pub enum PdfError {
    /// 1-based page number outside `[1, page_count]`
    #[error("page {0} out of range (document has {1} pages)")]
    PageOutOfRange(usize, usize),
    /// Operation requires at least one page
    #[error("document has no pages")]
    NoPages,
    /// The page has no content object (freshly parsed or deleted)
    #[error("page {0} has no content object")]
    ContentObjNotFound(usize),
    /// Element index invalid on its page
    #[error("element index {0} out of range (page has {1} elements)")]
    ElementOutOfRange(usize, usize),
    /// Modification is not defined for that element kind
    #[error("operation not supported for element kind {0:?}")]
    UnsupportedElementOp(&'static str),
    /// A required string argument was empty
    #[error("required argument was an empty string")]
    EmptyString,
    /// `set_font` was called without a font family
    #[error("missing font family")]
    MissingFontFamily,
    /// `set_font` references a family+style that was never registered
    #[error("font \"{0}\" (style \"{1}\") was not added to the document")]
    FontNotFound(String, String),
    /// TrueType table missing, unsupported cmap, bad offsets
    #[error("font parse error: {0}")]
    FontParse(String),
    /// Unsupported image format, 16-bit PNG, unknown filter
    #[error("image parse error: {0}")]
    ImageParse(String),
    /// Short ciphertext, bad padding, bad key length
    #[error("cipher error: {0}")]
    CipherParse(String),
    /// Authentication failed for both owner and user password
    #[error("neither owner nor user password matched")]
    EncryptBadPassword,
    /// The encryption method named in the file is not supported
    #[error("unsupported encryption method: {0}")]
    UnsupportedEncryptionMethod(String),
    /// Cross-reference table unreadable even after a rebuild attempt
    #[error("pdf parse error: {0}")]
    PdfParse(String),
    /// Original bytes have no recoverable xref, or the /Root drifted
    #[error("incremental save not possible: {0}")]
    IncrementalInvalid(String),
    /// Batch delete would remove every page
    #[error("operation would remove every page")]
    WouldEmpty,
    /// No placeholder with that name exists in the document
    #[error("placeholder \"{0}\" not found")]
    PlaceholderNotFound(String),
    /// Page rotation must be a multiple of 90
    #[error("unsupported page rotation: {0} (must be a multiple of 90)")]
    UnsupportedRotation(i32),
    /// Write or draw after the document was closed
    #[error("document is already closed")]
    DocumentClosed,
    /// Mismatched save/restore graphics state pairs on a page
    #[error("page {0}: unbalanced graphics state (depth {1} at end of page)")]
    UnbalancedGraphicsState(usize, i32),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PdfError>;
