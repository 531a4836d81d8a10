//! # ユースケース層
//!
//! ジョブの投入から配信までを組み立てる。
//!
//! ```text
//! JobQueue → Dispatcher → WorkerPool → Worker → MailDelivery
//!                                                 ├─ RenderPipeline
//!                                                 └─ Mailer
//! ```

pub mod delivery;
pub mod dispatcher;
pub mod job_queue;
pub mod render;
pub mod worker;
pub mod worker_pool;

pub use delivery::MailDelivery;
pub use dispatcher::{Dispatcher, DispatcherError, DispatcherHandle, ShutdownReport};
pub use job_queue::{EnqueueError, JobQueue, JobReceiver, job_queue};
pub use render::{
    CssInliner,
    Html2TextDeriver,
    PlainTextDeriver,
    RenderPipeline,
    StyleInliner,
    TemplateSource,
};
pub use worker::Worker;
pub use worker_pool::{WorkerInbox, WorkerPool};
