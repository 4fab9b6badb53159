use thiserror::Error;

#[derive(Error, Debug)]
pub enum CookieError {
    #[error("cookie {0} does not exist")]
    NotFound(u64),

    #[error("cookie {0} was already replied to")]
    AlreadyReplied(u64),
}

pub type Result<T> = std::result::Result<T, CookieError>;
