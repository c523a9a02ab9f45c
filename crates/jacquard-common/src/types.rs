pub mod aturi;
pub mod blob;
pub mod cid;
pub mod collection;
pub mod crypto;
pub mod datetime;
pub mod did;
pub mod did_doc;
pub mod handle;
pub mod ident;
pub mod language;
pub mod nsid;
pub mod recordkey;
pub mod string;
pub mod tid;
pub mod uri;
pub mod value;
pub mod xrpc;

/// Trait for a constant string literal type
pub trait Literal: Clone + Copy + PartialEq + Eq + Send + Sync + 'static {
    /// The string literal
    const LITERAL: &'static str;
}

/// Coarse shape of a lexicon string value, used to pick which `AtprotoStr`
/// variant a raw string should be parsed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexiconStringType {
    Datetime,
    AtUri,
    Did,
    Handle,
    AtIdentifier,
    Nsid,
    Cid,
    Language,
    Tid,
    RecordKey,
    Uri(UriType),
    String,
}

/// Hint for which kind of URI a `Uri::Any` catch-all was probably meant to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriType {
    Any,
}

/// Top-level shape of an atproto data-model value, used for error reporting
/// and key-based type inference in [`value::Data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataModelType {
    Null,
    Boolean,
    Integer,
    String(LexiconStringType),
    Bytes,
    CidLink,
    Array,
    Object,
    Blob,
}
