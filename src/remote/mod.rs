mod client;
mod resolver;

pub use client::NextcloudClient;
pub use resolver::{join_remote_path, RemotePathResolver};
