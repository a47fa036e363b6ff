use thiserror::Error;

/// The only error a caller can observe: the bytes handed to [`crate::Context::init`]
/// don't match any supported snapshot format.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("snapshot is {len} bytes, too short to contain any supported format")]
    TooShort { len: usize },
    #[error("snapshot does not start with a recognized magic string")]
    UnrecognizedMagic,
}
