pub mod authenticator;
pub mod storage;
pub mod token;

pub use authenticator::{
    Clock, HttpTokenExchange, RequestError, SystemClock, TokenClient, TokenExchange,
};
pub use storage::{JsonTokenStorage, TokenStorage};
pub use token::Credential;
