#![warn(unreachable_pub, unused_qualifications)]

//! *A Rust client library for the Heurist image generation API.*
//!
//! # Overview
//!
//! The [Client] hands out three resources:
//!
//! - [Images]: direct image generation jobs on the sequencer
//! - [SmartGen]: a language model turns a plain description into a tuned
//!   prompt, which is then rendered by [Images]
//! - [Workflow]: upscaling, FLUX LoRA and text to video tasks with result
//!   polling and cancellation
//!
//! Every call is a single request/response pair. Nothing is retried, and
//! dropping a returned future cancels the request in flight.
//!
//! # Authentication
//!
//! The client requires a Heurist API key which can be provided in two ways:
//! - Environment variable: `HEURIST_API_KEY` (with `HEURIST_BASE_URL` and
//!   `HEURIST_WORKFLOW_URL` as optional overrides), read by [Client::from_env]
//! - Programmatically: `Client::new(ClientOptions::new().api_key(key))`
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use heurist::{Client, types::{ImageGenerationParams, SmartGenParams}};
//!
//! #[tokio::main]
//! async fn main() -> heurist::Result<()> {
//!     let client = Client::from_env()?;
//!
//!     let image = client
//!         .images()
//!         .generate(ImageGenerationParams::new("FLUX.1-dev", "A serene landscape"))
//!         .await?;
//!     println!("{}", image.url);
//!
//!     let smart = client
//!         .smartgen()
//!         .generate_image(SmartGenParams::new("A magical forest at twilight").levels(4, 5, 5, 4))
//!         .await?;
//!     println!("{:?}", smart.url());
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod images;
mod options;
mod smartgen;
pub mod types;
mod workflow;

pub type Result<T> = std::result::Result<T, Error>;

pub use client::Client;
pub use error::{Error, Stage};
pub use images::Images;
pub use options::{
    API_KEY_ENV, BASE_URL_ENV, ClientOptions, DEFAULT_BASE_URL, WORKFLOW_URL_ENV,
};
pub use smartgen::SmartGen;
pub use workflow::{DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT, MIN_POLL_INTERVAL, Workflow};
