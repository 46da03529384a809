//! End-to-end operation tests against the mock executor

use super::*;
use crate::mock::{MockCall, MockConnection, MockConnector, MockState};
use crate::predicate::Condition;
use crate::schema::CatalogColumn;
use crate::value::SqlDbType;
use crate::BulkRecord;
use fake::faker::lorem::en::{Paragraph, Sentence};
use fake::Fake;
use rand::Rng;
use rust_decimal::Decimal;
use sea_query::Value;

#[derive(BulkRecord, Debug, Clone, Default, PartialEq)]
#[rename_all = "PascalCase"]
struct Book {
    id: i32,
    isbn: String,
    title: String,
    price: Decimal,
    description: Option<String>,
    tags: Vec<String>,
}

#[derive(BulkRecord, Debug, Clone, Default)]
#[rename_all = "PascalCase"]
struct Ledger {
    #[read_only]
    id: i64,
    account: String,
}

fn books_catalog() -> Vec<CatalogColumn> {
    vec![
        CatalogColumn::new("Id", "int").not_null(),
        CatalogColumn::new("Isbn", "varchar").with_max_length(20).not_null(),
        CatalogColumn::new("Title", "nvarchar").with_max_length(256).not_null(),
        CatalogColumn::new("Price", "decimal").with_precision(18, 2).not_null(),
        CatalogColumn::new("Description", "nvarchar").with_max_length(-1),
    ]
}

fn connector() -> MockConnector {
    let connector = MockConnector::new();
    connector.add_table(TableRef::new("dbo", "Books"), books_catalog());
    connector
}

fn ops() -> BulkOperations {
    BulkOperations::new(BulkguardConfig::with_url("Server=mock;Database=Library"))
}

fn fake_books(n: usize) -> Vec<Book> {
    fake_books_from(0, n)
}

/// `n` books with ISBNs numbered from `first`
fn fake_books_from(first: usize, n: usize) -> Vec<Book> {
    let mut rng = rand::thread_rng();
    (first..first + n)
        .map(|i| Book {
            id: 0,
            isbn: format!("978-{i:010}"),
            title: Sentence(2..5).fake(),
            price: Decimal::new(rng.gen_range(100..10_000i64), 2),
            description: if rng.gen_bool(0.5) {
                Some(Paragraph(1..2).fake())
            } else {
                None
            },
            tags: Vec::new(),
        })
        .collect()
}

/// The data statement, i.e. the executed MERGE or INSERT INTO
fn data_statement(state: &MockState) -> &str {
    state
        .executed()
        .into_iter()
        .find(|sql| sql.starts_with("MERGE") || sql.starts_with("INSERT INTO"))
        .unwrap_or_default()
}

#[test]
fn test_insert_loads_directly_into_target() {
    let connector = connector();
    let mut books = fake_books(1000);

    ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .with_bulk_copy_batch_size(250)
        .bulk_insert()
        .set_identity_column("id")
        .commit(&connector)
        .unwrap();

    let state = connector.state();
    assert_eq!(state.rows_loaded("[dbo].[Books]"), 1000);
    assert_eq!(state.rows_loaded("#TmpTable"), 0);
    assert!(state.executed().is_empty());

    let load = state.last_load("[dbo].[Books]").unwrap();
    let destinations: Vec<_> = load.mappings.iter().map(|m| m.destination.as_str()).collect();
    assert_eq!(destinations, vec!["Isbn", "Title", "Price", "Description"]);
    assert_eq!(load.settings.batch_size, 250);
    assert_eq!((state.begins, state.commits, state.rollbacks), (1, 1, 0));
}

#[test]
fn test_insert_keep_identity_loads_identity_column() {
    let connector = connector();
    let mut books = fake_books(3);

    ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .with_bulk_copy_options(BulkCopyOption::KeepIdentity)
        .bulk_insert()
        .set_identity_column("id")
        .commit(&connector)
        .unwrap();

    let state = connector.state();
    let load = state.last_load("[dbo].[Books]").unwrap();
    assert_eq!(load.table.column_index("Id"), Some(0));
    assert_eq!(load.settings.options, BulkCopyOption::KeepIdentity);
}

#[test]
fn test_insert_output_identity_round_trip() {
    let connector = connector();
    connector.script_query(
        "#TmpOutput",
        vec![
            vec![Value::Int(Some(101))],
            vec![Value::Int(Some(102))],
            vec![Value::Int(Some(103))],
        ],
    );
    let mut books = fake_books(3);

    ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .bulk_insert()
        .set_identity_column_with_direction("id", ColumnDirection::InputOutput)
        .commit(&connector)
        .unwrap();

    let ids: Vec<i32> = books.iter().map(|b| b.id).collect();
    assert_eq!(ids, vec![101, 102, 103]);

    let state = connector.state();
    let executed = state.executed();
    assert_eq!(
        executed[0],
        "CREATE TABLE #TmpTable([Id] int, [Isbn] varchar(20), [Title] nvarchar(256), \
         [Price] decimal(18, 2), [Description] nvarchar(max));"
    );
    assert_eq!(executed[1], "CREATE TABLE #TmpOutput([Id] int);");
    assert_eq!(
        executed[2],
        "INSERT INTO [dbo].[Books] ([Isbn], [Title], [Price], [Description]) \
         OUTPUT INSERTED.[Id] INTO #TmpOutput([Id]) \
         SELECT [Source].[Isbn], [Source].[Title], [Source].[Price], [Source].[Description] \
         FROM #TmpTable AS Source; DROP TABLE #TmpTable;"
    );
    assert_eq!(executed[3], "DROP TABLE #TmpOutput;");
    assert!(matches!(
        state.calls.iter().rev().nth(1),
        Some(MockCall::Query(sql)) if sql == "SELECT [Id] FROM #TmpOutput ORDER BY [Id];"
    ));
}

#[test]
fn test_insert_output_identity_count_mismatch_rolls_back() {
    let connector = connector();
    connector.script_query("#TmpOutput", vec![vec![Value::Int(Some(1))]]);
    let mut books = fake_books(2);

    let err = ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .bulk_insert()
        .set_identity_column_with_direction("id", ColumnDirection::InputOutput)
        .commit(&connector)
        .unwrap_err();

    assert!(matches!(err, BulkError::Mapping { ref column, operation: OperationKind::Insert, .. } if column == "Id"));
    let state = connector.state();
    assert_eq!((state.commits, state.rollbacks), (0, 1));
}

#[test]
fn test_update_without_match_column_fails_before_any_call() {
    let connector = connector();
    let mut books = fake_books(5);

    let err = ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .bulk_update()
        .commit(&connector)
        .unwrap_err();

    assert!(matches!(
        err,
        BulkError::Config(ConfigError::MissingMatchTargetOn {
            operation: OperationKind::Update
        })
    ));
    let state = connector.state();
    assert_eq!(state.connections_opened, 0);
    assert!(state.calls.is_empty());
}

#[test]
fn test_update_with_predicates() {
    let connector = connector();
    let mut books = fake_books(4);

    let affected = ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .bulk_update()
        .match_target_on("isbn")
        .set_identity_column("id")
        .update_when(Condition::is_null("description"))
        .update_when(Condition::le("price", Decimal::new(1999, 2)))
        .commit(&connector)
        .unwrap();

    assert_eq!(affected, 4);
    let state = connector.state();
    let data = state
        .statements
        .iter()
        .find(|s| s.sql.starts_with("MERGE"))
        .unwrap();
    assert!(data.sql.contains(
        "ON [Target].[Isbn] = [Source].[Isbn] \
         WHEN MATCHED AND [Target].[Description] IS NULL AND [Target].[Price] <= @Price \
         THEN UPDATE SET [Target].[Isbn] = [Source].[Isbn], [Target].[Title] = [Source].[Title], \
         [Target].[Price] = [Source].[Price], [Target].[Description] = [Source].[Description] ; \
         DROP TABLE #TmpTable;"
    ));
    assert_eq!(data.params.len(), 1);
    assert_eq!(data.params[0].name, "@Price");
    assert_eq!(data.params[0].sql_type, SqlDbType::Decimal);
    assert_eq!(data.params[0].value, Value::from(Decimal::new(1999, 2)));
}

/// Stored target row for `isbn` as (title, price)
fn stored_book(state: &MockState, isbn: &str) -> Option<(Value, Value)> {
    let isbn = Value::String(Some(isbn.to_string()));
    state
        .table_rows("[dbo].[Books]")
        .iter()
        .find(|row| row.get("Isbn") == Some(&isbn))
        .map(|row| (row["Title"].clone(), row["Price"].clone()))
}

fn expected(book: &Book) -> Option<(Value, Value)> {
    Some((Value::String(Some(book.title.clone())), Value::from(book.price)))
}

#[test]
fn test_upsert_applies_mutations_and_keeps_untouched_rows() {
    let connector = connector();
    let mut books = fake_books(500);
    ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .bulk_insert()
        .set_identity_column("id")
        .commit(&connector)
        .unwrap();
    assert_eq!(connector.state().table_rows("[dbo].[Books]").len(), 500);

    let originals = books.clone();
    for book in books.iter_mut().take(200) {
        book.title = format!("{} (2nd edition)", book.title);
        book.price += Decimal::ONE;
    }
    books.extend(fake_books_from(500, 200));

    ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .bulk_insert_or_update()
        .match_target_on("isbn")
        .set_identity_column("id")
        .commit(&connector)
        .unwrap();

    let state = connector.state();
    assert_eq!(state.rows_loaded("#TmpTable"), 700);
    assert_eq!(state.table_rows("[dbo].[Books]").len(), 700);

    for book in &books[..200] {
        assert!(book.title.ends_with("(2nd edition)"));
        assert_eq!(stored_book(&state, &book.isbn), expected(book));
    }
    for (book, original) in books[200..500].iter().zip(&originals[200..]) {
        assert_eq!(book, original);
        assert_eq!(stored_book(&state, &book.isbn), expected(original));
    }
    for book in &books[500..] {
        assert_eq!(stored_book(&state, &book.isbn), expected(book));
    }

    let data = data_statement(&state);
    assert!(data.contains(
        "WHEN NOT MATCHED BY TARGET THEN INSERT ([Isbn], [Title], [Price], [Description]) \
         values ([Source].[Isbn], [Source].[Title], [Source].[Price], [Source].[Description]) ; "
    ));
    assert!(!data.contains("NOT MATCHED BY SOURCE"));
}

#[test]
fn test_upsert_delete_predicates_need_delete_when_not_matched() {
    let connector = connector();
    let mut books = fake_books(2);

    let err = ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .bulk_insert_or_update()
        .match_target_on("isbn")
        .delete_when(Condition::eq("title", "Obsolete"))
        .commit(&connector)
        .unwrap_err();

    assert!(matches!(
        err,
        BulkError::Config(ConfigError::DeletePredicatesWithoutDeleteWhenNotMatched)
    ));
    let state = connector.state();
    assert!(state.calls.is_empty());
    assert!(!state.executed().iter().any(|sql| sql.contains("DELETE")));
}

#[test]
fn test_upsert_delete_when_not_matched_with_output_identity() {
    let connector = connector();
    connector.script_query(
        "#TmpOutput",
        vec![
            vec![Value::Int(Some(1)), Value::Int(Some(11))],
            vec![Value::Int(None), Value::Int(Some(99))],
            vec![Value::Int(Some(0)), Value::Int(Some(10))],
        ],
    );
    let mut books = fake_books(2);

    ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .bulk_insert_or_update()
        .match_target_on("isbn")
        .set_identity_column_with_direction("id", ColumnDirection::InputOutput)
        .update_when(Condition::ne("title", "Locked"))
        .delete_when_not_matched(true)
        .delete_when(Condition::eq("title", "Obsolete"))
        .commit(&connector)
        .unwrap();

    assert_eq!(books[0].id, 10);
    assert_eq!(books[1].id, 11);

    let state = connector.state();
    let executed = state.executed();
    assert!(executed[0].ends_with("[Description] nvarchar(max), [InternalId] int);"));
    assert_eq!(executed[1], "CREATE TABLE #TmpOutput([InternalId] int, [Id] int);");

    let data = state
        .statements
        .iter()
        .find(|s| s.sql.starts_with("MERGE"))
        .unwrap();
    assert!(data.sql.contains("WHEN MATCHED AND [Target].[Title] <> @Title THEN UPDATE"));
    assert!(data.sql.contains(
        "WHEN NOT MATCHED BY SOURCE AND [Target].[Title] = @Title_2 THEN DELETE \
         OUTPUT Source.[InternalId], INSERTED.[Id] INTO #TmpOutput([InternalId], [Id]); \
         DROP TABLE #TmpTable;"
    ));
    let names: Vec<_> = data.params.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["@Title", "@Title_2"]);

    let sequence = state.last_load("#TmpTable").unwrap().table.column_values("InternalId").unwrap();
    assert_eq!(sequence, vec![&Value::Int(Some(0)), &Value::Int(Some(1))]);
}

#[test]
fn test_delete_with_predicate_and_output_identity() {
    let connector = connector();
    connector.script_query("#TmpOutput", vec![vec![Value::Int(Some(2)), Value::Int(Some(300))]]);
    let mut books = fake_books(3);

    let affected = ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("dbo.Books")
        .with_column("isbn")
        .bulk_delete()
        .match_target_on("isbn")
        .delete_when(Condition::gt("price", Decimal::new(500, 2)))
        .set_identity_column_with_direction("id", ColumnDirection::InputOutput)
        .commit(&connector)
        .unwrap();

    assert_eq!(affected, 3);
    assert_eq!(books.iter().map(|b| b.id).collect::<Vec<_>>(), vec![0, 0, 300]);

    let state = connector.state();
    assert_eq!(
        state.executed()[0],
        "CREATE TABLE #TmpTable([Isbn] varchar(20), [Id] int, [InternalId] int);"
    );
    assert!(data_statement(&state).contains(
        "WHEN MATCHED AND [Target].[Price] > @Price THEN DELETE \
         OUTPUT Source.[InternalId], DELETED.[Id] INTO #TmpOutput([InternalId], [Id]); "
    ));
}

#[test]
fn test_index_hints_wrap_data_statement() {
    let connector = connector();
    let mut books = fake_books(2);

    ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .tmp_disable_non_clustered_index("IX_Books_Title")
        .tmp_disable_non_clustered_index("IX_Books_Price")
        .bulk_update()
        .match_target_on("isbn")
        .commit(&connector)
        .unwrap();

    let state = connector.state();
    let executed = state.executed();
    let position = |needle: &str| executed.iter().position(|sql| sql.contains(needle)).unwrap();
    let disable = position("DISABLE");
    let data = position("MERGE INTO");
    let rebuild = position("REBUILD");
    assert!(disable < data && data < rebuild);
    assert!(executed[disable].contains("sys.indexes.name IN ('IX_Books_Price', 'IX_Books_Title')"));
}

#[test]
fn test_direct_insert_disables_indexes_around_load() {
    let connector = connector();
    let mut books = fake_books(2);

    ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .tmp_disable_all_non_clustered_indexes()
        .bulk_insert()
        .commit(&connector)
        .unwrap();

    let calls = connector.state().calls;
    let load = calls
        .iter()
        .position(|c| matches!(c, MockCall::BulkLoad { .. }))
        .unwrap();
    assert!(matches!(&calls[load - 1], MockCall::Execute(sql) if sql.contains("DISABLE")));
    assert!(matches!(&calls[load + 1], MockCall::Execute(sql) if sql.contains("REBUILD")));
}

/// Commit an insert configured by `configure` and return its configuration error
fn config_error(configure: impl FnOnce(TableSetup<'_, Book>) -> TableSetup<'_, Book>) -> ConfigError {
    let connector = connector();
    let mut books = fake_books(1);
    let setup = ops().setup::<Book>().for_collection(&mut books).with_table("Books");
    let err = configure(setup).bulk_insert().commit(&connector).unwrap_err();
    assert_eq!(connector.state().connections_opened, 0);
    match err {
        BulkError::Config(e) => e,
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

#[test]
fn test_configuration_errors_surface_at_commit() {
    assert_eq!(
        config_error(|s| s.with_column("publisher")),
        ConfigError::InvalidColumn {
            field: "publisher".into(),
            record: "Book",
        }
    );
    assert_eq!(
        config_error(|s| s.with_column("tags")),
        ConfigError::UnsupportedColumnType {
            field: "tags".into(),
            record: "Book",
            type_name: "Vec<String>",
        }
    );
    assert_eq!(
        config_error(|s| s.remove_column("title")),
        ConfigError::ColumnNotIncluded {
            field: "title".into(),
        }
    );
    assert_eq!(
        config_error(|s| {
            s.tmp_disable_all_non_clustered_indexes()
                .tmp_disable_non_clustered_index("IX_Books_Title")
        }),
        ConfigError::ConflictingIndexHints
    );
}

#[test]
fn test_first_configuration_error_wins() {
    assert_eq!(
        config_error(|s| s.with_column("publisher").remove_column("title")),
        ConfigError::InvalidColumn {
            field: "publisher".into(),
            record: "Book",
        }
    );
}

#[test]
fn test_missing_table_name() {
    let connector = connector();
    let mut books = fake_books(1);
    let err = ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .add_all_columns()
        .bulk_insert()
        .commit(&connector)
        .unwrap_err();
    assert!(matches!(err, BulkError::Config(ConfigError::MissingTableName)));
}

#[test]
fn test_match_column_must_be_selected() {
    let connector = connector();
    let mut books = fake_books(1);
    let err = ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .with_column("title")
        .bulk_update()
        .match_target_on("isbn")
        .commit(&connector)
        .unwrap_err();
    assert!(matches!(
        err,
        BulkError::Config(ConfigError::MatchColumnNotSelected { ref field }) if field == "isbn"
    ));
}

#[test]
fn test_second_identity_column_is_rejected() {
    let connector = connector();
    let mut books = fake_books(1);
    let err = ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .bulk_insert_or_update()
        .match_target_on("isbn")
        .set_identity_column("id")
        .set_identity_column("price")
        .commit(&connector)
        .unwrap_err();
    assert!(matches!(
        err,
        BulkError::Config(ConfigError::DuplicateIdentityColumn { ref existing, ref requested })
            if existing == "id" && requested == "price"
    ));
}

#[test]
fn test_identity_column_joins_column_set() {
    let connector = connector();
    let mut books = fake_books(1);
    ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .with_column("isbn")
        .with_column("title")
        .bulk_update()
        .match_target_on("isbn")
        .set_identity_column("id")
        .commit(&connector)
        .unwrap();

    let state = connector.state();
    assert_eq!(
        state.executed()[0],
        "CREATE TABLE #TmpTable([Isbn] varchar(20), [Title] nvarchar(256), [Id] int);"
    );
}

#[test]
fn test_insert_needs_a_column_besides_identity() {
    let connector = connector();
    let mut books = fake_books(2);
    let err = ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .bulk_insert()
        .set_identity_column_with_direction("id", ColumnDirection::InputOutput)
        .commit(&connector)
        .unwrap_err();
    assert!(matches!(
        err,
        BulkError::Config(ConfigError::NoColumnsSelected {
            operation: OperationKind::Insert
        })
    ));
    assert_eq!(connector.state().connections_opened, 0);

    let err = ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .bulk_insert()
        .commit(&connector)
        .unwrap_err();
    assert!(matches!(err, BulkError::Config(ConfigError::NoColumnsSelected { .. })));
    assert!(connector.state().calls.is_empty());
}

#[test]
fn test_delete_may_stage_only_the_match_column() {
    let connector = connector();
    let mut books = fake_books(2);
    ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .bulk_delete()
        .match_target_on("id")
        .set_identity_column("id")
        .commit(&connector)
        .unwrap();
    assert!(data_statement(&connector.state()).contains("THEN DELETE"));
}

#[test]
fn test_relational_predicate_against_null_is_rejected() {
    let connector = connector();
    let mut books = fake_books(1);
    let err = ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .bulk_update()
        .match_target_on("isbn")
        .update_when(Condition::lt("description", Option::<String>::None))
        .commit(&connector)
        .unwrap_err();
    assert!(matches!(
        err,
        BulkError::Config(ConfigError::InvalidPredicate { ref field, .. }) if field == "description"
    ));
    assert_eq!(connector.state().connections_opened, 0);
}

#[test]
fn test_read_only_output_identity_is_rejected() {
    let connector = MockConnector::new();
    connector.add_table(
        TableRef::new("dbo", "Ledger"),
        vec![
            CatalogColumn::new("Id", "bigint").not_null(),
            CatalogColumn::new("Account", "nvarchar").with_max_length(64),
        ],
    );
    let mut entries = vec![Ledger::default()];

    let err = ops()
        .setup::<Ledger>()
        .for_collection(&mut entries)
        .with_table("Ledger")
        .add_all_columns()
        .bulk_insert()
        .set_identity_column_with_direction("id", ColumnDirection::InputOutput)
        .commit(&connector)
        .unwrap_err();

    match err {
        BulkError::Mapping {
            column,
            operation,
            message,
        } => {
            assert_eq!(column, "Id");
            assert_eq!(operation, OperationKind::Insert);
            assert!(message.contains("ColumnDirection::Input"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(connector.state().connections_opened, 0);
}

#[test]
fn test_empty_collection_is_a_no_op() {
    let connector = connector();
    let mut books: Vec<Book> = Vec::new();
    let affected = ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .bulk_update()
        .match_target_on("isbn")
        .commit(&connector)
        .unwrap();
    assert_eq!(affected, 0);
    assert_eq!(connector.state().connections_opened, 0);
}

#[test]
fn test_unknown_table_rolls_back_before_ddl() {
    let connector = connector();
    let mut books = fake_books(2);
    let err = ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Archive")
        .add_all_columns()
        .bulk_update()
        .match_target_on("isbn")
        .commit(&connector)
        .unwrap_err();

    assert!(matches!(err, BulkError::TableNotFound { ref table } if table == "[dbo].[Archive]"));
    let state = connector.state();
    assert!(state.executed().is_empty());
    assert_eq!((state.commits, state.rollbacks), (0, 1));
}

#[test]
fn test_custom_column_mapping_applies_everywhere() {
    let connector = MockConnector::new();
    connector.add_table(
        TableRef::new("sales", "Inventory"),
        vec![
            CatalogColumn::new("BookIsbn", "varchar").with_max_length(20),
            CatalogColumn::new("DisplayTitle", "nvarchar").with_max_length(100),
        ],
    );
    let mut books = fake_books(2);

    ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Inventory")
        .with_schema("sales")
        .with_column("isbn")
        .with_column("title")
        .with_custom_column_mapping("isbn", "BookIsbn")
        .with_custom_column_mapping("title", "DisplayTitle")
        .bulk_update()
        .match_target_on("isbn")
        .update_when(Condition::ne("title", "Draft"))
        .commit(&connector)
        .unwrap();

    let state = connector.state();
    let catalog = &state.statements[0];
    assert_eq!(catalog.params[0].value, Value::String(Some("sales".into())));
    assert_eq!(catalog.params[1].value, Value::String(Some("Inventory".into())));
    assert_eq!(
        state.executed()[0],
        "CREATE TABLE #TmpTable([BookIsbn] varchar(20), [DisplayTitle] nvarchar(100));"
    );
    assert_eq!(
        data_statement(&state),
        "MERGE INTO [sales].[Inventory] WITH (HOLDLOCK) AS Target USING #TmpTable AS Source \
         ON [Target].[BookIsbn] = [Source].[BookIsbn] \
         WHEN MATCHED AND [Target].[DisplayTitle] <> @DisplayTitle \
         THEN UPDATE SET [Target].[BookIsbn] = [Source].[BookIsbn], \
         [Target].[DisplayTitle] = [Source].[DisplayTitle] ; DROP TABLE #TmpTable;"
    );
    let load = state.last_load("#TmpTable").unwrap();
    assert_eq!(load.mappings[1].destination, "DisplayTitle");
}

#[test]
fn test_column_missing_from_table_is_an_error() {
    let connector = connector();
    let mut books = fake_books(1);
    let err = ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .with_custom_column_mapping("title", "BookTitle")
        .bulk_update()
        .match_target_on("isbn")
        .commit(&connector)
        .unwrap_err();
    assert!(matches!(err, BulkError::ColumnNotInTable { ref column, .. } if column == "BookTitle"));
    assert_eq!(connector.state().rollbacks, 1);
}

#[test]
fn test_identity_write_error_is_translated() {
    let connector = connector();
    connector.fail_on("MERGE", Some(8102), "Cannot update identity column 'Id'.");
    let mut books = fake_books(2);

    let err = ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .bulk_update()
        .match_target_on("isbn")
        .commit(&connector)
        .unwrap_err();

    assert!(matches!(err, BulkError::Identity { .. }));
    let state = connector.state();
    assert_eq!((state.commits, state.rollbacks), (0, 1));
}

#[test]
fn test_commit_in_leaves_transaction_to_caller() {
    let mut conn = MockConnection::new();
    conn.add_table(TableRef::new("dbo", "Books"), books_catalog());
    let mut books = fake_books(3);

    let affected = ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .bulk_delete()
        .match_target_on("isbn")
        .commit_in(&mut conn)
        .unwrap();

    assert_eq!(affected, 3);
    let state = conn.state();
    assert_eq!((state.begins, state.commits, state.rollbacks), (0, 0, 0));
    assert_eq!(state.connections_opened, 0);
}

#[test]
fn test_tuning_reaches_executor() {
    let connector = connector();
    let mut books = fake_books(2);

    ops()
        .setup::<Book>()
        .for_collection(&mut books)
        .with_table("Books")
        .add_all_columns()
        .with_bulk_copy_timeout(Duration::from_secs(90))
        .with_bulk_copy_enable_streaming(true)
        .with_bulk_copy_notify_after(1)
        .with_bulk_copy_options(BulkCopyOption::TableLock)
        .with_sql_command_timeout(Duration::from_secs(30))
        .bulk_insert_or_update()
        .match_target_on("isbn")
        .commit(&connector)
        .unwrap();

    let state = connector.state();
    let settings = &state.last_load("#TmpTable").unwrap().settings;
    assert_eq!(settings.bulk_copy_timeout, Duration::from_secs(90));
    assert!(settings.enable_streaming);
    assert_eq!(settings.notify_after, 1);
    assert_eq!(settings.options, BulkCopyOption::TableLock);
    assert_eq!(state.command_timeout, Some(Duration::from_secs(30)));
    assert_eq!(state.connection_strings, vec!["Server=mock;Database=Library".to_string()]);
}

#[test]
fn test_commit_async_matches_sync() {
    let sync_connector = connector();
    let mut sync_books = fake_books(5);
    ops()
        .setup::<Book>()
        .for_collection(&mut sync_books)
        .with_table("Books")
        .add_all_columns()
        .bulk_insert_or_update()
        .match_target_on("isbn")
        .set_identity_column("id")
        .commit(&sync_connector)
        .unwrap();

    let async_connector = connector();
    let mut async_books = sync_books.clone();
    let affected = futures::executor::block_on(
        ops()
            .setup::<Book>()
            .for_collection(&mut async_books)
            .with_table("Books")
            .add_all_columns()
            .bulk_insert_or_update()
            .match_target_on("isbn")
            .set_identity_column("id")
            .commit_async(&async_connector),
    )
    .unwrap();

    assert_eq!(affected, 5);
    let (sync_state, async_state) = (sync_connector.state(), async_connector.state());
    assert_eq!(sync_state.calls, async_state.calls);
    assert_eq!((async_state.begins, async_state.commits), (1, 1));
}

#[test]
fn test_commit_in_async_with_output_identity() {
    let mut conn = MockConnection::new();
    conn.add_table(TableRef::new("dbo", "Books"), books_catalog());
    conn.script_query("#TmpOutput", vec![vec![Value::Int(Some(0)), Value::Int(Some(77))]]);
    let mut books = fake_books(1);

    let affected = futures::executor::block_on(
        ops()
            .setup::<Book>()
            .for_collection(&mut books)
            .with_table("Books")
            .add_all_columns()
            .bulk_update()
            .match_target_on("isbn")
            .set_identity_column_with_direction("id", ColumnDirection::InputOutput)
            .commit_in_async(&mut conn),
    )
    .unwrap();

    assert_eq!(affected, 1);
    assert_eq!(books[0].id, 77);
    assert_eq!(conn.state().begins, 0);
}
