pub mod document;
pub mod index_record;

/// Items that can be addressed by a key in the search index.
pub trait StoredObject {
    fn key_field() -> &'static str;
    fn get_id(&self) -> &str;
}
