//! Mirror engine: page and asset transfers, run folder output and the
//! stage pipeline that turns a page URL into a self-contained folder.
mod admission;
mod control;
mod decode;
mod download;
mod engine;
mod fetch;
mod mirror;
mod persist;
mod registry;
mod reporter;
mod types;

pub use admission::{Admission, AdmissionDecision};
pub use control::RunControl;
pub use decode::{decode_page, decode_stylesheet, DecodedPage};
pub use engine::EngineHandle;
pub use fetch::{
    ChannelProgressSink, FetchResponse, FetchSettings, Fetcher, NullProgressSink, ProgressSink,
    ReqwestFetcher, DEFAULT_USER_AGENT,
};
pub use mirror::{regenerate_template, KindCounts, Mirror, MirrorConfig, MirrorError, MirrorReport};
pub use persist::{create_run_folder, ensure_output_dir, AtomicFileWriter, PersistError, StagedFile};
pub use registry::{AssetRegistry, Slot, TransferCancelled};
pub use types::{
    EngineEvent, FailureKind, FetchError, FetchMetadata, FetchOutput, Stage, StageProgress,
    TaskProgress,
};
