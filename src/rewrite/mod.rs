pub mod client;
pub mod policy;
pub mod request;
pub mod state;
pub mod stream;

pub use client::RewriteClient;
pub use policy::InputPolicy;
pub use state::{NO_RESULT_PLACEHOLDER, RequestState, RewriteOutcome};
pub use stream::{ChunkReader, Utf8StreamDecoder, read_text_stream};
