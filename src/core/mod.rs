// Core modules implementing wire decoding, the message tree, JSON transcoding, and errors.
pub mod decode;
pub mod error;
pub mod transcode;
pub mod tree;
pub mod wire;
