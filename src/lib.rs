pub mod analyse;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod files;
pub mod index;
pub mod query;
pub mod storage;
pub mod types;

pub use analyse::{AnalyseRequest, Analysis, TextCompletion};
pub use config::{Config, Encoding};
pub use crypto::Algorithm;
pub use db::{Borealis, ConvertReport, ConvertTarget, CreateReceipt, TOKEN_FIELD};
pub use error::{Result, StoreError};
pub use files::{ImageData, ImageOptions, ImageReceipt, ImageTransform};
pub use query::{Condition, Conditions, SearchConditions, SearchTerm};
pub use types::{Document, QueryResult, Value};
