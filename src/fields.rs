//! Translation from the external query vocabulary to storage column names.
//!
//! Nothing here validates input: callers parse raw query strings into
//! [`crate::query::SortSpec`] first, so every value reaching this module is
//! already known.

/// Fields clients may filter or sort tasks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalField {
    Status,
    Type,
    Deadline,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

impl ExternalField {
    pub fn column(self) -> &'static str {
        match self {
            ExternalField::Status => "task_status",
            ExternalField::Type => "task_type",
            ExternalField::Deadline => "task_deadline",
            ExternalField::CreatedAt => "created_at",
        }
    }
}

/// Maps an external sort key such as `-deadline` to its column and direction.
///
/// A leading `-` selects descending order. The remaining name is looked up
/// without validation; anything other than `deadline` is treated as
/// `createdAt`.
pub fn map_sort_key(key: &str) -> (&'static str, SortDirection) {
    let (name, direction) = match key.strip_prefix('-') {
        Some(rest) => (rest, SortDirection::Descending),
        None => (key, SortDirection::Ascending),
    };
    let field = match name {
        "deadline" => ExternalField::Deadline,
        _ => ExternalField::CreatedAt,
    };
    (field.column(), direction)
}
