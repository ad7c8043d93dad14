pub mod keyword;

pub use keyword::KeywordSelector;
