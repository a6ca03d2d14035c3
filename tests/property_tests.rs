//! Property-based tests for values, column conversion and statement generation using proptest

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use rust_dbmap::core::dialect::rebind;
use rust_dbmap::core::record::FieldDef;
use rust_dbmap::prelude::*;

#[derive(Debug, Default)]
struct Sample {
    id: i64,
    name: String,
    note: Option<String>,
    version: i64,
}

impl_record!(Sample {
    id: i64,
    name: String,
    note: Option<String>,
    version: i64,
});

fn sample_table() -> TableMap {
    let mut table = TableMap::derive::<Sample>(None);
    table.set_keys(true, &["id"]);
    table
}

// ============================================================================
// Column Value Conversion Tests
// ============================================================================

proptest! {
    /// Integer fields accept any integer value that fits
    #[test]
    fn test_i32_from_long(value in any::<i32>()) {
        let read = <i32 as ColumnValue>::from_value(DatabaseValue::Long(value as i64)).unwrap();
        prop_assert_eq!(read, value);
    }

    /// Out-of-range integers are rejected instead of truncated
    #[test]
    fn test_i16_rejects_overflow(value in (i16::MAX as i64 + 1)..i64::MAX) {
        prop_assert!(<i16 as ColumnValue>::from_value(DatabaseValue::Long(value)).is_err());
    }

    /// Optional fields map NULL to None and anything else to Some
    #[test]
    fn test_option_follows_null(value in proptest::option::of(any::<i64>())) {
        let stored = value.to_value();
        prop_assert_eq!(stored.is_null(), value.is_none());
        let read = <Option<i64> as ColumnValue>::from_value(stored).unwrap();
        prop_assert_eq!(read, value);
    }

    /// Timestamps survive storage as microseconds
    #[test]
    fn test_timestamp_micros(micros in 0i64..4_000_000_000_000_000) {
        let ts = DateTime::<Utc>::from_timestamp_micros(micros).unwrap();
        let stored = DatabaseValue::Long(ts.timestamp_micros());
        let read = <DateTime<Utc> as ColumnValue>::from_value(stored).unwrap();
        prop_assert_eq!(read, ts);
    }

    /// Max-size checks count characters, not bytes
    #[test]
    fn test_size_counts_chars(value in "\\PC{0,40}") {
        let size = DatabaseValue::String(value.clone()).size();
        prop_assert_eq!(size, Some(value.chars().count()));
    }
}

// ============================================================================
// Placeholder Rewriting Tests
// ============================================================================

proptest! {
    /// Every unquoted `?` becomes a numbered PostgreSQL placeholder
    #[test]
    fn test_rebind_numbers_placeholders(parts in prop::collection::vec("[a-z ]{0,8}", 1..10)) {
        let query = parts.join("?");
        let rebound = rebind(&query, &PostgresDialect);

        prop_assert!(!rebound.contains('?'));
        for i in 1..parts.len() {
            let placeholder = format!("${}", i);
            prop_assert!(rebound.contains(&placeholder));
        }
    }

    /// SQLite placeholders are left alone
    #[test]
    fn test_rebind_sqlite_is_identity(query in "[a-z ?]{0,40}") {
        prop_assert_eq!(rebind(&query, &SqliteDialect), query);
    }

    /// Question marks inside string literals are not placeholders
    #[test]
    fn test_rebind_skips_literals(literal in "[a-z?]{0,12}") {
        let query = format!("select * from t where a = '{}' and b = ?", literal);
        let rebound = rebind(&query, &PostgresDialect);
        let expected = format!("select * from t where a = '{}' and b = $1", literal);
        prop_assert_eq!(rebound, expected);
    }
}

// ============================================================================
// Mapping Tests
// ============================================================================

proptest! {
    /// Default column names are the lower-cased field names
    #[test]
    fn test_default_column_name(name in "[A-Za-z][A-Za-z0-9_]{0,15}") {
        let leaked: &'static str = Box::leak(name.clone().into_boxed_str());
        let col = ColumnMap::from_field(&FieldDef::of::<i64>(leaked, None));
        prop_assert_eq!(col.column_name, name.to_lowercase());
        prop_assert_eq!(col.is_version, name.eq_ignore_ascii_case("version"));
    }

    /// Renamed tables are quoted in every generated statement
    #[test]
    fn test_plans_use_table_name(name in "[a-z][a-z0-9_]{0,15}") {
        let mut table = sample_table();
        table.set_table_name(name.clone());
        let quoted = format!("\"{}\"", name);

        prop_assert!(table.insert_plan(&SqliteDialect).unwrap().query.contains(&quoted));
        prop_assert!(table.update_plan(&SqliteDialect).unwrap().query.contains(&quoted));
        prop_assert!(table.delete_plan(&SqliteDialect).unwrap().query.contains(&quoted));
        prop_assert!(table.get_plan(&SqliteDialect).unwrap().query.contains(&quoted));
    }

    /// Bound arguments line up with the statement's placeholders
    #[test]
    fn test_update_args_match_placeholders(id in any::<i64>(), version in 1i64..1_000_000, name in "[a-z]{0,10}") {
        let table = sample_table();
        let plan = table.update_plan(&PostgresDialect).unwrap();
        let record = Sample { id, name: name.clone(), note: None, version };

        let args = plan.bind_args(&record, Some(version)).unwrap();
        prop_assert_eq!(args.len(), plan.args.len());
        let last = format!("${}", args.len());
        let past_end = format!("${}", args.len() + 1);
        prop_assert!(plan.query.contains(&last));
        prop_assert!(!plan.query.contains(&past_end));
        prop_assert_eq!(&args[0], &DatabaseValue::String(name));
        prop_assert_eq!(args.last().unwrap(), &DatabaseValue::Long(version));
        prop_assert!(args.contains(&DatabaseValue::Long(version + 1)));
    }
}
