pub mod validator;
pub mod wallet;

pub use validator::{ConnectRejection, ShareRejection, ShareSubmission, ShareValidator};
