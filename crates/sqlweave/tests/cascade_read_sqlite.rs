mod fixtures;

use asupersync::Cx;
use asupersync::runtime::RuntimeBuilder;
use fixtures::{Author, Post, PostMeta, setup, unwrap_outcome};
use sqlweave::Weave;
use sqlweave_core::Value;
use std::sync::Arc;

fn seed_author(conn: &sqlweave_sqlite::SqliteConnection, name: &str) -> i64 {
    conn.insert_sync("INSERT INTO authors (name) VALUES (?)", &[name.into()])
        .expect("seed author")
}

fn seed_post(conn: &sqlweave_sqlite::SqliteConnection, title: &str, author_id: i64) -> i64 {
    conn.insert_sync(
        "INSERT INTO posts (title, author_id) VALUES (?, ?)",
        &[title.into(), author_id.into()],
    )
    .expect("seed post")
}

fn seed_tag(conn: &sqlweave_sqlite::SqliteConnection, label: &str) -> i64 {
    conn.insert_sync("INSERT INTO tags (label) VALUES (?)", &[label.into()])
        .expect("seed tag")
}

fn link(conn: &sqlweave_sqlite::SqliteConnection, post_id: i64, tag_id: i64) {
    conn.insert_sync(
        "INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)",
        &[post_id.into(), tag_id.into()],
    )
    .expect("seed link");
}

#[test]
fn one_level_load_populates_every_relation() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = setup();
        let author_id = seed_author(&conn, "ada");
        conn.insert_sync(
            "INSERT INTO profiles (bio, author_id) VALUES (?, ?)",
            &["writes compilers".into(), author_id.into()],
        )
        .unwrap();
        let first = seed_post(&conn, "one", author_id);
        let second = seed_post(&conn, "two", author_id);

        let weave = Weave::new(&conn);
        let author = unwrap_outcome(
            weave
                .load_by_key_with_children::<Author>(&cx, author_id.into(), false)
                .await,
        );

        let guard = author.read().unwrap();
        let profile = guard.profile.as_ref().expect("profile loaded");
        assert_eq!(profile.read().unwrap().bio, "writes compilers");

        let posts = guard.posts.as_ref().expect("posts loaded");
        let mut ids: Vec<i64> = posts
            .iter()
            .map(|p| p.read().unwrap().id.unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![first, second]);

        // Inverse scalar references are stitched even at one level.
        for post in posts {
            let post_guard = post.read().unwrap();
            let back = post_guard.author.as_ref().expect("inverse stitched");
            assert!(Arc::ptr_eq(back, &author));
            // One level only: the posts' own relations stay untouched.
            assert!(post_guard.tags.is_none());
        }
    });
}

#[test]
fn recursive_load_terminates_on_cycles_with_identity() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = setup();
        let author_id = seed_author(&conn, "grace");
        conn.insert_sync(
            "INSERT INTO profiles (bio, author_id) VALUES (?, ?)",
            &["compiles".into(), author_id.into()],
        )
        .unwrap();

        let weave = Weave::new(&conn);
        let author = unwrap_outcome(
            weave
                .load_by_key_with_children::<Author>(&cx, author_id.into(), true)
                .await,
        );

        // author -> profile -> author resolves to the identical instance,
        // not a duplicate.
        let profile = author.read().unwrap().profile.clone().expect("profile");
        let back = profile.read().unwrap().author.clone().expect("back ref");
        assert!(Arc::ptr_eq(&author, &back));
    });
}

#[test]
fn empty_collection_is_populated_not_unset() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = setup();
        let author_id = seed_author(&conn, "loner");

        let weave = Weave::new(&conn);
        let author = unwrap_outcome(
            weave
                .load_by_key_with_children::<Author>(&cx, author_id.into(), false)
                .await,
        );

        let guard = author.read().unwrap();
        let posts = guard.posts.as_ref().expect("empty but populated");
        assert!(posts.is_empty());
    });
}

#[test]
fn many_to_many_and_text_blob_load() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = setup();
        let post_id = conn
            .insert_sync(
                "INSERT INTO posts (title, meta_json) VALUES (?, ?)",
                &[
                    "tagged".into(),
                    r#"{"summary":"short","stars":4}"#.into(),
                ],
            )
            .unwrap();
        let rust = seed_tag(&conn, "rust");
        let sql = seed_tag(&conn, "sql");
        seed_tag(&conn, "unlinked");
        link(&conn, post_id, rust);
        link(&conn, post_id, sql);

        let weave = Weave::new(&conn);
        let post = unwrap_outcome(
            weave
                .load_by_key_with_children::<Post>(&cx, post_id.into(), true)
                .await,
        );

        let guard = post.read().unwrap();
        let tags = guard.tags.as_ref().expect("tags loaded");
        let mut labels: Vec<String> = tags
            .iter()
            .map(|t| t.read().unwrap().label.clone())
            .collect();
        labels.sort();
        assert_eq!(labels, vec!["rust".to_string(), "sql".to_string()]);

        assert_eq!(
            guard.meta,
            Some(PostMeta {
                summary: "short".to_string(),
                stars: 4,
            })
        );
    });
}

#[test]
fn sibling_batch_shares_one_identity_per_key() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = setup();
        let author_id = seed_author(&conn, "shared");
        seed_post(&conn, "a", author_id);
        seed_post(&conn, "b", author_id);

        let weave = Weave::new(&conn);
        let posts = unwrap_outcome(
            weave
                .load_all_with_children::<Post>(&cx, None, true)
                .await,
        );
        assert_eq!(posts.len(), 2);

        let first_author = posts[0].read().unwrap().author.clone().expect("author");
        let second_author = posts[1].read().unwrap().author.clone().expect("author");
        assert!(Arc::ptr_eq(&first_author, &second_author));
    });
}

#[test]
fn filtered_load_restricts_the_root_set() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = setup();
        let author_id = seed_author(&conn, "filter");
        seed_post(&conn, "keep", author_id);
        seed_post(&conn, "drop", author_id);

        let weave = Weave::new(&conn);
        let posts = unwrap_outcome(
            weave
                .load_all_with_children::<Post>(
                    &cx,
                    Some(("title = ?", &[Value::Text("keep".to_string())])),
                    false,
                )
                .await,
        );

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].read().unwrap().title, "keep");
    });
}

#[test]
fn cache_eligible_tags_resolve_to_one_instance_across_posts() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = setup();
        let author_id = seed_author(&conn, "taggy");
        let p1 = seed_post(&conn, "p1", author_id);
        let p2 = seed_post(&conn, "p2", author_id);
        let shared = seed_tag(&conn, "shared");
        link(&conn, p1, shared);
        link(&conn, p2, shared);

        let weave = Weave::new(&conn);
        let author = unwrap_outcome(
            weave
                .load_by_key_with_children::<Author>(&cx, author_id.into(), true)
                .await,
        );

        let guard = author.read().unwrap();
        let posts = guard.posts.as_ref().unwrap();
        let tag_handles: Vec<_> = posts
            .iter()
            .map(|p| p.read().unwrap().tags.clone().unwrap()[0].clone())
            .collect();
        assert_eq!(tag_handles.len(), 2);
        assert!(Arc::ptr_eq(&tag_handles[0], &tag_handles[1]));
    });
}
