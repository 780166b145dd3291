//! Out-of-process inpainting.
//!
//! The parent ([`parent::CleanJob`]) writes a static mask image and spawns the worker binary with
//! a [`protocol::WorkerInvocation`]. The worker ([`child::InpaintWorker`]) reports progress as
//! `PROGRESS:<f>` lines on stdout and failure through its exit code plus `<output>.log`.

pub mod child;
pub mod parent;
pub mod protocol;
