pub mod bulk_transfer;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod exchange;
pub mod held_paths;
pub mod local_watcher;
pub mod logging;
pub mod model;
pub mod path_matcher;
pub mod synchronizer;
pub mod transport;
pub mod tree_differ;
pub mod tree_lister;
pub mod uploader;
