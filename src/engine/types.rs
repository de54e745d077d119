//! Data types for the search engine
//!
//! Contains the value types that flow between the coordinator, the shard
//! workers and the caller:
//! - Catalog-side descriptions (`ShardInfo`, `BookRecord`, `TableName`)
//! - Query input (`SearchQuery`, `AllowedTables`)
//! - Row and result types (`ContentRow`, `SearchResultItem`)

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::query::MatchMode;

/// Numeric shard (archive) identifier; also the shard's file stem
pub type ShardId = u32;

/// Numeric book identifier
pub type BookId = u64;

// ============================================================================
// Tables and shards
// ============================================================================

/// Name of a per-book content table, always rendered as `b{book_id}`
///
/// Table names are built from numeric ids only, so SQL text that embeds them
/// never carries caller-controlled characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TableName(BookId);

impl TableName {
    pub fn for_book(book_id: BookId) -> Self {
        Self(book_id)
    }

    pub fn book_id(self) -> BookId {
        self.0
    }

    /// Companion FTS5 table in the attached `fts` schema
    pub fn fts_table(self) -> String {
        format!("b{}_fts", self.0)
    }

    /// Flat table-of-contents table in the shard file
    pub fn toc_table(self) -> String {
        format!("t{}", self.0)
    }

    /// Parse `b{digits}`; anything else is rejected
    pub fn parse(name: &str) -> Option<Self> {
        let digits = name.strip_prefix('b')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(Self)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

impl From<TableName> for String {
    fn from(name: TableName) -> Self {
        name.to_string()
    }
}

impl TryFrom<String> for TableName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("not a book table name: {value}"))
    }
}

/// A book as known to the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: BookId,
    pub title: String,
}

/// One shard and the books stored in it
///
/// Built once from the catalog and read-only while a search runs. Books are
/// kept in insertion order with duplicates removed, which fixes the order in
/// which a worker walks the shard's tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardInfo {
    pub id: ShardId,
    books: Vec<BookRecord>,
}

impl ShardInfo {
    pub fn new(id: ShardId, books: impl IntoIterator<Item = BookRecord>) -> Self {
        let mut seen = HashSet::new();
        let books = books
            .into_iter()
            .filter(|book| seen.insert(book.id))
            .collect();
        Self { id, books }
    }

    pub fn books(&self) -> &[BookRecord] {
        &self.books
    }

    /// Tables in shard order
    pub fn tables(&self) -> impl Iterator<Item = TableName> + '_ {
        self.books.iter().map(|b| TableName::for_book(b.id))
    }

    pub fn title_of(&self, table: TableName) -> Option<&str> {
        self.books
            .iter()
            .find(|b| b.id == table.book_id())
            .map(|b| b.title.as_str())
    }

    /// Tables that take part in a run restricted by `allowed`
    pub fn eligible_tables(&self, allowed: Option<&AllowedTables>) -> Vec<TableName> {
        self.tables()
            .filter(|t| allowed.map_or(true, |a| a.contains(*t)))
            .collect()
    }
}

// ============================================================================
// Query input
// ============================================================================

/// Optional restriction on which tables participate in a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedTables(HashSet<TableName>);

impl AllowedTables {
    pub fn contains(&self, table: TableName) -> bool {
        self.0.contains(&table)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<TableName> for AllowedTables {
    fn from_iter<I: IntoIterator<Item = TableName>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Keywords plus match mode
///
/// Keywords arrive already normalized; blank entries are dropped on
/// construction so `is_empty` reflects whether a run may start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub mode: MatchMode,
    keywords: Vec<String>,
}

impl SearchQuery {
    pub fn new<I, S>(mode: MatchMode, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords = keywords
            .into_iter()
            .map(Into::into)
            .map(|k: String| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Self { mode, keywords }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// FTS5 MATCH expression for this query
    pub fn fts_expression(&self) -> String {
        self.mode.build(&self.keywords)
    }
}

// ============================================================================
// Rows and results
// ============================================================================

/// One decoded row of a book table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRow {
    pub id: i64,
    pub text: String,
    pub page: i64,
    pub part: i64,
    pub chapter: Option<i64>,
    pub verse: Option<i64>,
}

/// One search hit as surfaced to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub shard_id: ShardId,
    pub table: TableName,
    pub content_id: i64,
    pub book_title: String,
    pub page: i64,
    pub part: i64,
    pub snippet: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(id: BookId, title: &str) -> BookRecord {
        BookRecord {
            id,
            title: title.to_string(),
        }
    }

    #[test]
    fn test_table_name_round_trip() {
        let table = TableName::for_book(42);
        assert_eq!(table.to_string(), "b42");
        assert_eq!(table.fts_table(), "b42_fts");
        assert_eq!(table.toc_table(), "t42");
        assert_eq!(TableName::parse("b42"), Some(table));
    }

    #[test]
    fn test_table_name_rejects_non_numeric() {
        assert_eq!(TableName::parse("b"), None);
        assert_eq!(TableName::parse("b4; DROP TABLE x"), None);
        assert_eq!(TableName::parse("t42"), None);
        assert_eq!(TableName::parse("b-1"), None);
    }

    #[test]
    fn test_shard_info_dedupes_and_keeps_order() {
        let shard = ShardInfo::new(3, vec![book(9, "a"), book(2, "b"), book(9, "c")]);
        let tables: Vec<_> = shard.tables().map(|t| t.book_id()).collect();
        assert_eq!(tables, vec![9, 2]);
        assert_eq!(shard.title_of(TableName::for_book(9)), Some("a"));
    }

    #[test]
    fn test_eligible_tables_filters_by_allowed() {
        let shard = ShardInfo::new(1, vec![book(1, "a"), book(2, "b"), book(3, "c")]);
        let allowed: AllowedTables = [TableName::for_book(3), TableName::for_book(1)]
            .into_iter()
            .collect();
        let eligible = shard.eligible_tables(Some(&allowed));
        assert_eq!(
            eligible,
            vec![TableName::for_book(1), TableName::for_book(3)]
        );
        assert_eq!(shard.eligible_tables(None).len(), 3);
    }

    #[test]
    fn test_query_drops_blank_keywords() {
        let query = SearchQuery::new(MatchMode::Contains, ["  ", "", "علم "]);
        assert_eq!(query.keywords(), ["علم".to_string()]);
        assert!(!query.is_empty());
        assert!(SearchQuery::new(MatchMode::Phrase, [" "]).is_empty());
    }
}
