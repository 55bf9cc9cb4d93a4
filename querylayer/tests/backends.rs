//! The same scenarios against SQLite and the in-memory document store.

mod common;

use bson::{Bson, doc};
use futures::FutureExt;
use std::time::Duration;
use tokio::time::sleep;

use querylayer::prelude::*;

use common::{backends, id_of, names, seed, titles};

#[tokio::test]
async fn inserted_documents_are_found_by_id() {
    for backend in backends().await {
        let people = backend.manager.table("people");

        let bob = people.insert_one(doc! { "name": "Bob", "age": 29_i64 }).await.unwrap();
        let found = people.find_by_id(&id_of(&bob)).await.unwrap();

        assert_eq!(found, Some(bob), "{}", backend.label);
    }
}

#[tokio::test]
async fn generated_ids_are_distinct_strings() {
    for backend in backends().await {
        let fixture = seed(&backend.manager).await;

        let mut ids = [&fixture.ann, &fixture.bob, &fixture.cid].map(id_of).to_vec();
        ids.sort();
        ids.dedup();

        assert_eq!(ids.len(), 3, "{}", backend.label);
    }
}

#[tokio::test]
async fn writes_check_the_id_shape() {
    for backend in backends().await {
        let people = backend.manager.table("people");
        let fixture = seed(&backend.manager).await;

        let missing = people.update_one(doc! { "name": "Nobody" }).await.unwrap_err();
        assert!(matches!(missing, DatabaseError::InvalidDocument(_)), "{}", backend.label);

        let present = people.insert_one(fixture.ann.clone()).await.unwrap_err();
        assert!(matches!(present, DatabaseError::InvalidDocument(_)), "{}", backend.label);

        let batch = people
            .insert_many(vec![doc! { "name": "Dee" }, fixture.bob.clone()])
            .await
            .unwrap_err();
        assert!(matches!(batch, DatabaseError::InvalidDocument(_)), "{}", backend.label);
        assert_eq!(people.count().await.unwrap(), 3, "{}", backend.label);
    }
}

#[tokio::test]
async fn malformed_ids_read_as_not_found() {
    for backend in backends().await {
        seed(&backend.manager).await;

        let people = backend.manager.table("people");
        assert_eq!(people.find_by_id("not-an-id").await.unwrap(), None, "{}", backend.label);
        assert!(
            people.clone().where_eq("id", "not-an-id").get().await.unwrap().is_empty(),
            "{}",
            backend.label
        );
    }
}

#[tokio::test]
async fn updates_and_deletes_by_id() {
    for backend in backends().await {
        let people = backend.manager.table("people");
        let fixture = seed(&backend.manager).await;

        let mut older = fixture.bob.clone();
        older.insert("age", 25_i64);
        assert_eq!(people.update_one(older).await.unwrap(), 1, "{}", backend.label);

        let bob = people.find_by_id(&id_of(&fixture.bob)).await.unwrap().unwrap();
        assert_eq!(bob.get_i64("age").unwrap(), 25, "{}", backend.label);
        assert_eq!(bob.get_str("name").unwrap(), "Bob", "{}", backend.label);

        let deleted = people
            .delete_many(vec![fixture.ann.clone(), fixture.cid.clone()])
            .await
            .unwrap();
        assert_eq!(deleted, 2, "{}", backend.label);
        assert_eq!(names(&people.get().await.unwrap()), ["Bob"], "{}", backend.label);
    }
}

#[tokio::test]
async fn where_clauses_filter_and_order() {
    for backend in backends().await {
        seed(&backend.manager).await;
        let people = backend.manager.table("people").order_by("name", Direction::Asc);

        let older = people.clone().where_("age", Operator::Gt, 26_i64).get().await.unwrap();
        assert_eq!(names(&older), ["Ann", "Cid"], "{}", backend.label);

        let either = people
            .clone()
            .where_eq("name", "Bob")
            .or_where("age", Operator::Gte, 40_i64)
            .get()
            .await
            .unwrap();
        assert_eq!(names(&either), ["Bob", "Cid"], "{}", backend.label);

        let listed = people.clone().where_in("name", ["Ann", "Cid", "Zed"]).get().await.unwrap();
        assert_eq!(names(&listed), ["Ann", "Cid"], "{}", backend.label);

        let excluded = people.clone().where_not_in("name", ["Ann"]).get().await.unwrap();
        assert_eq!(names(&excluded), ["Bob", "Cid"], "{}", backend.label);

        let between = people.clone().where_between("age", 24_i64, 31_i64).get().await.unwrap();
        assert_eq!(names(&between), ["Ann", "Bob"], "{}", backend.label);

        let like = people.clone().where_like("name", "%o%").get().await.unwrap();
        assert_eq!(names(&like), ["Bob"], "{}", backend.label);

        let lowercase_prefix = people.clone().where_like("name", "a%").get().await.unwrap();
        assert_eq!(names(&lowercase_prefix), ["Ann"], "{}", backend.label);

        let uppercase_infix = people.clone().where_like("name", "%I_").get().await.unwrap();
        assert_eq!(names(&uppercase_infix), ["Cid"], "{}", backend.label);

        let grouped = people
            .clone()
            .where_("age", Operator::Lt, 35_i64)
            .where_group(Connective::And, |group| group.where_eq("name", "Ann").or_where("name", Operator::Eq, "Cid"))
            .get()
            .await
            .unwrap();
        assert_eq!(names(&grouped), ["Ann"], "{}", backend.label);

        let descending = backend
            .manager
            .table("people")
            .order_by("age", Direction::Desc)
            .limit(2)
            .get()
            .await
            .unwrap();
        assert_eq!(names(&descending), ["Cid", "Ann"], "{}", backend.label);
    }
}

#[tokio::test]
async fn find_options_support_partial_and_fuzzy_search() {
    for backend in backends().await {
        seed(&backend.manager).await;
        let people = backend.manager.table("people");

        let exact = people.find_one(FindOptions::new(doc! { "name": "Ann" })).await.unwrap();
        assert_eq!(exact.map(|row| names(&[row])), Some(vec!["Ann".to_string()]), "{}", backend.label);

        assert_eq!(
            people.find_one(FindOptions::new(doc! { "name": "an" })).await.unwrap(),
            None,
            "{}",
            backend.label
        );

        let partial = people
            .find_many(FindOptions::new(doc! { "name": "an" }).partial().order_by("name", Direction::Asc))
            .await
            .unwrap();
        assert_eq!(names(&partial), ["Ann"], "{}", backend.label);

        let fuzzy = people
            .find_many(FindOptions::new(doc! { "name": "AN" }).fuzzy().order_by("name", Direction::Asc))
            .await
            .unwrap();
        assert_eq!(names(&fuzzy), ["Ann"], "{}", backend.label);

        let scattered = people.find_many(FindOptions::new(doc! { "name": "cd" }).fuzzy()).await.unwrap();
        assert_eq!(names(&scattered), ["Cid"], "{}", backend.label);

        let not_contiguous = people.find_many(FindOptions::new(doc! { "name": "cd" }).partial()).await.unwrap();
        assert!(not_contiguous.is_empty(), "{}", backend.label);

        let paged = people
            .find_many(FindOptions::new(Document::new()).order_by("age", Direction::Asc).skip(1).limit(1))
            .await
            .unwrap();
        assert_eq!(names(&paged), ["Ann"], "{}", backend.label);
    }
}

#[tokio::test]
async fn null_checks_and_distinct() {
    for backend in backends().await {
        seed(&backend.manager).await;
        let posts = backend.manager.table("posts");

        let orphans = posts.clone().where_null("author_id").get().await.unwrap();
        assert_eq!(titles(&orphans), ["p3"], "{}", backend.label);

        assert_eq!(posts.clone().where_not_null("author_id").count().await.unwrap(), 2, "{}", backend.label);

        let authors = posts.clone().distinct(["author_id"]).get().await.unwrap();
        assert_eq!(authors.len(), 2, "{}", backend.label);
        assert!(authors.iter().all(|row| row.len() == 1), "{}", backend.label);
    }
}

#[tokio::test]
async fn paginate_counts_the_unpaged_query() {
    for backend in backends().await {
        seed(&backend.manager).await;
        let people = backend.manager.table("people").order_by("name", Direction::Asc);

        let page = people.paginate(PaginationParams::new(2, 2)).await.unwrap();

        assert_eq!(names(&page.items), ["Cid"], "{}", backend.label);
        assert_eq!(page.count, 3, "{}", backend.label);
        assert_eq!(page.previous_page, Some(1), "{}", backend.label);
        assert_eq!(page.next_page, None, "{}", backend.label);

        assert!(people.exists().await.unwrap(), "{}", backend.label);
        let first = people.first().await.unwrap();
        assert_eq!(first.map(|row| names(&[row])), Some(vec!["Ann".to_string()]), "{}", backend.label);
    }
}

#[tokio::test]
async fn relationships_issue_one_lookup_each() {
    for backend in backends().await {
        let fixture = seed(&backend.manager).await;
        let people = backend.manager.table("people");
        let posts = backend.manager.table("posts");

        let author = people.belongs_to(&fixture.posts[0], "author_id", "id").await.unwrap();
        assert_eq!(author.as_ref().map(id_of), Some(id_of(&fixture.ann)), "{}", backend.label);

        let orphan = people.belongs_to(&fixture.posts[2], "author_id", "id").await.unwrap();
        assert_eq!(orphan, None, "{}", backend.label);

        let written = posts.has_many(&fixture.ann, "id", "author_id").await.unwrap();
        assert_eq!(written.len(), 2, "{}", backend.label);

        let none = posts.has_many(&fixture.bob, "id", "author_id").await.unwrap();
        assert!(none.is_empty(), "{}", backend.label);

        let absent_key = posts.has_many(&doc! { "name": "ghost" }, "id", "author_id").await.unwrap();
        assert!(absent_key.is_empty(), "{}", backend.label);
    }
}

#[tokio::test]
async fn eager_loads_embed_related_rows() {
    for backend in backends().await {
        seed(&backend.manager).await;

        let rows = backend
            .manager
            .table("people")
            .order_by("name", Direction::Asc)
            .with("posts", Relationship::has_many("id", "author_id", "posts"))
            .get()
            .await
            .unwrap();

        let counts = rows
            .iter()
            .map(|row| row.get_array("posts").map(Vec::len).unwrap_or(usize::MAX))
            .collect::<Vec<_>>();
        assert_eq!(counts, [2, 0, 0], "{}", backend.label);

        let posts = backend
            .manager
            .table("posts")
            .order_by("title", Direction::Asc)
            .with("author", Relationship::belongs_to("author_id", "id", "people"))
            .get()
            .await
            .unwrap();

        assert!(matches!(posts[0].get("author"), Some(Bson::Document(_))), "{}", backend.label);
        assert_eq!(posts[2].get("author"), Some(&Bson::Null), "{}", backend.label);
    }
}

#[tokio::test]
async fn left_joins_keep_unmatched_rows_with_null_targets() {
    for backend in backends().await {
        let fixture = seed(&backend.manager).await;

        let rows = backend
            .manager
            .table("posts")
            .left_join("people", "author_id", "id")
            .order_by("title", Direction::Asc)
            .get()
            .await
            .unwrap();

        assert_eq!(titles(&rows), ["p1", "p2", "p3"], "{}", backend.label);

        let author = rows[0].get_document("people").unwrap();
        assert_eq!(author.get_str("name").unwrap(), "Ann", "{}", backend.label);
        assert_eq!(id_of(author), id_of(&fixture.ann), "{}", backend.label);
        assert_eq!(rows[2].get("people"), Some(&Bson::Null), "{}", backend.label);
    }
}

#[tokio::test]
async fn inner_joins_drop_unmatched_rows() {
    for backend in backends().await {
        seed(&backend.manager).await;
        let joined = backend.manager.table("posts").inner_join("people", "author_id", "id");

        let rows = joined.clone().order_by("title", Direction::Asc).get().await.unwrap();
        assert_eq!(titles(&rows), ["p1", "p2"], "{}", backend.label);

        let none = joined.where_eq("title", "p3").get().await.unwrap();
        assert!(none.is_empty(), "{}", backend.label);
    }
}

#[tokio::test]
async fn full_joins_keep_both_sides() {
    for backend in backends().await {
        seed(&backend.manager).await;

        let rows = backend
            .manager
            .table("posts")
            .full_join("people", "author_id", "id")
            .get()
            .await
            .unwrap();

        assert_eq!(rows.len(), 5, "{}", backend.label);

        let without_author = rows.iter().filter(|row| row.get("people") == Some(&Bson::Null)).count();
        assert_eq!(without_author, 1, "{}", backend.label);

        let mut people_only = rows
            .iter()
            .filter(|row| row.get("title").is_none())
            .map(|row| row.get_document("people").unwrap().get_str("name").unwrap().to_string())
            .collect::<Vec<_>>();
        people_only.sort();
        assert_eq!(people_only, ["Bob", "Cid"], "{}", backend.label);
    }
}

#[tokio::test]
async fn right_joins_keep_unmatched_targets_only() {
    for backend in backends().await {
        let fixture = seed(&backend.manager).await;

        let rows = backend
            .manager
            .table("posts")
            .right_join("people", "author_id", "id")
            .get()
            .await
            .unwrap();

        assert_eq!(rows.len(), 4, "{}", backend.label);
        assert!(rows.iter().all(|row| matches!(row.get("people"), Some(Bson::Document(_)))), "{}", backend.label);

        let mut written = rows
            .iter()
            .filter(|row| row.get("title").is_some())
            .map(|row| {
                let author = row.get_document("people").unwrap();
                (row.get_str("title").unwrap().to_string(), id_of(author))
            })
            .collect::<Vec<_>>();
        written.sort();
        assert_eq!(
            written,
            [("p1".to_string(), id_of(&fixture.ann)), ("p2".to_string(), id_of(&fixture.ann))],
            "{}",
            backend.label
        );

        let mut people_only = rows
            .iter()
            .filter(|row| row.get("title").is_none())
            .map(|row| row.get_document("people").unwrap().get_str("name").unwrap().to_string())
            .collect::<Vec<_>>();
        people_only.sort();
        assert_eq!(people_only, ["Bob", "Cid"], "{}", backend.label);
    }
}

#[tokio::test]
async fn cross_joins_pair_every_row() {
    for backend in backends().await {
        seed(&backend.manager).await;

        let rows = backend.manager.table("posts").cross_join("people").get().await.unwrap();
        assert_eq!(rows.len(), 9, "{}", backend.label);

        for title in ["p1", "p2", "p3"] {
            let mut partners = rows
                .iter()
                .filter(|row| row.get_str("title").ok() == Some(title))
                .map(|row| row.get_document("people").unwrap().get_str("name").unwrap().to_string())
                .collect::<Vec<_>>();
            partners.sort();
            assert_eq!(partners, ["Ann", "Bob", "Cid"], "{} {title}", backend.label);
        }

        let narrowed = backend
            .manager
            .table("posts")
            .where_eq("title", "p3")
            .cross_join("people")
            .count()
            .await
            .unwrap();
        assert_eq!(narrowed, 3, "{}", backend.label);
    }
}

#[tokio::test]
async fn predicate_updates_and_deletes() {
    for backend in backends().await {
        seed(&backend.manager).await;
        let people = backend.manager.table("people");

        let updated = people
            .clone()
            .where_("age", Operator::Lt, 35_i64)
            .update(doc! { "age": 35_i64 })
            .await
            .unwrap();
        assert_eq!(updated, 2, "{}", backend.label);
        assert_eq!(people.clone().where_eq("age", 35_i64).count().await.unwrap(), 2, "{}", backend.label);

        let deleted = people.clone().where_eq("name", "Cid").delete().await.unwrap();
        assert_eq!(deleted, 1, "{}", backend.label);
        assert_eq!(people.count().await.unwrap(), 2, "{}", backend.label);
    }
}

#[tokio::test]
async fn truncate_keeps_the_table() {
    for backend in backends().await {
        seed(&backend.manager).await;
        let people = backend.manager.table("people");

        people.truncate().await.unwrap();

        assert_eq!(people.count().await.unwrap(), 0, "{}", backend.label);
        assert!(backend.schema.table_exists("people").await.unwrap(), "{}", backend.label);
    }
}

#[tokio::test]
async fn failed_transactions_leave_no_trace() {
    for backend in backends().await {
        seed(&backend.manager).await;

        let result: DatabaseResult<()> = backend
            .manager
            .transaction(|tx| {
                async move {
                    tx.table("people").insert_one(doc! { "name": "Dee", "age": 50_i64 }).await?;
                    tx.table("people").update_one(doc! { "name": "no id" }).await?;
                    Ok(())
                }
                .boxed()
            })
            .await;

        assert!(matches!(result, Err(DatabaseError::InvalidDocument(_))), "{}", backend.label);
        assert_eq!(backend.manager.table("people").count().await.unwrap(), 3, "{}", backend.label);

        let committed = backend
            .manager
            .transaction(|tx| async move { tx.table("people").insert_one(doc! { "name": "Eve", "age": 19_i64 }).await }.boxed())
            .await
            .unwrap();

        let found = backend.manager.table("people").find_by_id(&id_of(&committed)).await.unwrap();
        assert!(found.is_some(), "{}", backend.label);
    }
}

#[tokio::test]
async fn rolled_back_transactions_keep_concurrent_writes() {
    for backend in backends().await {
        let manager = &backend.manager;

        let failing = async {
            manager
                .transaction(|tx| {
                    async move {
                        tx.table("people").insert_one(doc! { "name": "InTx" }).await?;
                        sleep(Duration::from_millis(50)).await;
                        Err::<(), _>(DatabaseError::Unsupported("abandoned".to_string()))
                    }
                    .boxed()
                })
                .await
        };
        let outside = async {
            sleep(Duration::from_millis(10)).await;
            manager.table("people").insert_one(doc! { "name": "Outside" }).await
        };

        let (failed, inserted) = tokio::join!(failing, outside);
        assert!(failed.is_err(), "{}", backend.label);
        inserted.unwrap();

        let rows = manager.table("people").get().await.unwrap();
        assert_eq!(names(&rows), ["Outside"], "{}", backend.label);
    }
}

#[tokio::test]
async fn concurrent_transactions_run_one_after_another() {
    for backend in backends().await {
        let manager = &backend.manager;

        let insert = |name: &'static str| {
            manager.transaction(move |tx| {
                async move {
                    let row = tx.table("people").insert_one(doc! { "name": name }).await?;
                    sleep(Duration::from_millis(20)).await;
                    Ok(row)
                }
                .boxed()
            })
        };

        let (first, second) = tokio::join!(insert("First"), insert("Second"));
        first.unwrap();
        second.unwrap();

        let rows = manager.table("people").order_by("name", Direction::Asc).get().await.unwrap();
        assert_eq!(names(&rows), ["First", "Second"], "{}", backend.label);
    }
}

#[tokio::test]
async fn schema_lists_and_drops_tables() {
    for backend in backends().await {
        let mut tables = backend.schema.list_tables().await.unwrap();
        tables.sort();
        assert_eq!(tables, ["people", "posts"], "{}", backend.label);

        backend.schema.drop_table("posts").await.unwrap();
        assert!(!backend.schema.table_exists("posts").await.unwrap(), "{}", backend.label);
        backend.schema.drop_table("posts").await.unwrap();

        backend.schema.drop_all_tables().await.unwrap();
        assert!(backend.schema.list_tables().await.unwrap().is_empty(), "{}", backend.label);
    }
}

#[tokio::test]
async fn unbound_queries_fail_with_missing_table() {
    for backend in backends().await {
        let err = backend.manager.query().get().await.unwrap_err();
        assert!(matches!(err, DatabaseError::MissingTable), "{}", backend.label);
    }
}

#[tokio::test]
async fn cloned_queries_compile_identically_and_diverge_independently() {
    for backend in backends().await {
        let base = backend
            .manager
            .table("people")
            .where_("age", Operator::Gt, 20_i64)
            .or_where("name", Operator::Eq, "Cid")
            .left_join("posts", "id", "author_id")
            .order_by("name", Direction::Asc);
        let copy = base.clone();

        let sql = querylayer::sql::SqlCompiler::new(querylayer::sql::SqlDialect::Sqlite);
        let columns = querylayer::sql::JoinColumns::new();
        let documents = querylayer::document::DocumentCompiler::new();

        let base_sql = sql.compile_select(base.expression(), &columns).unwrap();
        let base_find = documents.compile_find(base.expression()).unwrap();
        assert_eq!(base_sql, sql.compile_select(copy.expression(), &columns).unwrap(), "{}", backend.label);
        assert_eq!(base_find, documents.compile_find(copy.expression()).unwrap(), "{}", backend.label);

        let narrowed = copy.where_eq("name", "Ann").limit(1);

        assert_eq!(sql.compile_select(base.expression(), &columns).unwrap(), base_sql, "{}", backend.label);
        assert_eq!(documents.compile_find(base.expression()).unwrap(), base_find, "{}", backend.label);
        assert_ne!(sql.compile_select(narrowed.expression(), &columns).unwrap(), base_sql, "{}", backend.label);
        assert_ne!(documents.compile_find(narrowed.expression()).unwrap(), base_find, "{}", backend.label);
        assert_eq!(narrowed.expression().wheres.len(), 3, "{}", backend.label);
    }
}
