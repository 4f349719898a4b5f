pub mod backend;
pub mod gemini;
pub mod media;

pub use backend::{BackendError, GenerativeBackend, RequestPart, TextRequest};
pub use gemini::GeminiBackend;
