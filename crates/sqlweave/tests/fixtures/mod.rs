//! Shared fixture models for the cascade integration tests.
//!
//! A small blog domain covering every relationship kind:
//!
//! - `Author` 1-1 `Profile` (key on the profile side, bidirectional)
//! - `Author` 1-N `Post` (key on the post side, naming convention)
//! - `Post` N-N `Tag` through `PostTag`
//! - `Post.meta` serialized into the `meta_json` text column

#![allow(dead_code)]

use asupersync::Outcome;
use serde::{Deserialize, Serialize};
use sqlweave::{
    BlobSpec, CascadeOps, CollectionSpec, Obj, ReferenceSpec, Related, Relation,
};
use sqlweave_core::{Error, FieldInfo, KeyInfo, Model, Result, Row, SqlType, Value, blob};
use sqlweave_sqlite::SqliteConnection;

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

/// Open an in-memory database with the fixture schema.
pub fn setup() -> SqliteConnection {
    let conn = SqliteConnection::open_memory().expect("open sqlite memory db");
    for ddl in [
        "CREATE TABLE authors (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL)",
        "CREATE TABLE profiles (id INTEGER PRIMARY KEY AUTOINCREMENT, bio TEXT NOT NULL, \
         author_id INTEGER)",
        "CREATE TABLE posts (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL, \
         author_id INTEGER, meta_json TEXT)",
        "CREATE TABLE tags (id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT NOT NULL)",
        "CREATE TABLE post_tags (id INTEGER PRIMARY KEY AUTOINCREMENT, \
         post_id INTEGER NOT NULL, tag_id INTEGER NOT NULL)",
    ] {
        conn.execute_raw(ddl).expect("create fixture table");
    }
    conn
}

// ============================================================================
// Author
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Author {
    pub id: Option<i64>,
    pub name: String,
    pub profile: Option<Obj<Profile>>,
    pub posts: Option<Vec<Obj<Post>>>,
}

impl Author {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl Model for Author {
    const TABLE_NAME: &'static str = "authors";
    const TYPE_NAME: &'static str = "Author";
    const PRIMARY_KEY: KeyInfo = KeyInfo::auto("id");

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", SqlType::Integer)
                .primary_key(true)
                .auto_increment(true),
            FieldInfo::new("name", SqlType::Text),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::from(self.id)),
            ("name", Value::Text(self.name.clone())),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
            profile: None,
            posts: None,
        })
    }

    fn primary_key(&self) -> Value {
        Value::from(self.id)
    }

    fn set_primary_key(&mut self, key: Value) {
        self.id = key.as_i64();
    }

    fn get_column(&self, column: &str) -> Option<Value> {
        match column {
            "id" => Some(Value::from(self.id)),
            "name" => Some(Value::Text(self.name.clone())),
            _ => None,
        }
    }

    fn set_column(&mut self, column: &str, value: Value) -> bool {
        match column {
            "id" => {
                self.id = value.as_i64();
                true
            }
            "name" => {
                self.name = value.as_str().unwrap_or_default().to_string();
                true
            }
            _ => false,
        }
    }
}

pub struct AuthorProfile;

impl ReferenceSpec for AuthorProfile {
    type Owner = Author;
    type Target = Profile;

    fn get(owner: &Author) -> Option<Obj<Profile>> {
        owner.profile.clone()
    }

    fn set(owner: &mut Author, value: Option<Obj<Profile>>) {
        owner.profile = value;
    }
}

pub struct AuthorPosts;

impl CollectionSpec for AuthorPosts {
    type Owner = Author;
    type Target = Post;

    fn get(owner: &Author) -> Option<Vec<Obj<Post>>> {
        owner.posts.clone()
    }

    fn set(owner: &mut Author, value: Option<Vec<Obj<Post>>>) {
        owner.posts = value;
    }
}

impl Related for Author {
    fn relations() -> &'static [Relation<Self>] {
        static RELATIONS: &[Relation<Author>] = &[
            Relation::one_to_one::<AuthorProfile>("profile").cascade(CascadeOps::ALL),
            Relation::one_to_many::<AuthorPosts>("posts").cascade(CascadeOps::ALL),
        ];
        RELATIONS
    }
}

// ============================================================================
// Profile
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub id: Option<i64>,
    pub bio: String,
    pub author_id: Option<i64>,
    pub author: Option<Obj<Author>>,
}

impl Profile {
    pub fn with_bio(bio: &str) -> Self {
        Self {
            bio: bio.to_string(),
            ..Self::default()
        }
    }
}

impl Model for Profile {
    const TABLE_NAME: &'static str = "profiles";
    const TYPE_NAME: &'static str = "Profile";
    const PRIMARY_KEY: KeyInfo = KeyInfo::auto("id");

    fn fields() -> &'static [FieldInfo] {
        // author_id is found by the `{Author}Id` naming convention.
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", SqlType::Integer)
                .primary_key(true)
                .auto_increment(true),
            FieldInfo::new("bio", SqlType::Text),
            FieldInfo::new("author_id", SqlType::Integer).nullable(true),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::from(self.id)),
            ("bio", Value::Text(self.bio.clone())),
            ("author_id", Value::from(self.author_id)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            bio: row.get_named("bio")?,
            author_id: row.get_named("author_id")?,
            author: None,
        })
    }

    fn primary_key(&self) -> Value {
        Value::from(self.id)
    }

    fn set_primary_key(&mut self, key: Value) {
        self.id = key.as_i64();
    }

    fn get_column(&self, column: &str) -> Option<Value> {
        match column {
            "id" => Some(Value::from(self.id)),
            "bio" => Some(Value::Text(self.bio.clone())),
            "author_id" => Some(Value::from(self.author_id)),
            _ => None,
        }
    }

    fn set_column(&mut self, column: &str, value: Value) -> bool {
        match column {
            "id" => {
                self.id = value.as_i64();
                true
            }
            "bio" => {
                self.bio = value.as_str().unwrap_or_default().to_string();
                true
            }
            "author_id" => {
                self.author_id = value.as_i64();
                true
            }
            _ => false,
        }
    }
}

pub struct ProfileAuthor;

impl ReferenceSpec for ProfileAuthor {
    type Owner = Profile;
    type Target = Author;

    fn get(owner: &Profile) -> Option<Obj<Author>> {
        owner.author.clone()
    }

    fn set(owner: &mut Profile, value: Option<Obj<Author>>) {
        owner.author = value;
    }
}

impl Related for Profile {
    fn relations() -> &'static [Relation<Self>] {
        static RELATIONS: &[Relation<Profile>] = &[
            Relation::one_to_one::<ProfileAuthor>("author")
                .foreign_key("author_id")
                .cascade(CascadeOps::READ),
        ];
        RELATIONS
    }
}

// ============================================================================
// Post
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostMeta {
    pub summary: String,
    pub stars: i64,
}

#[derive(Debug, Clone, Default)]
pub struct Post {
    pub id: Option<i64>,
    pub title: String,
    pub author_id: Option<i64>,
    pub author: Option<Obj<Author>>,
    pub tags: Option<Vec<Obj<Tag>>>,
    pub meta: Option<PostMeta>,
    pub meta_json: Option<String>,
}

impl Post {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }
}

impl Model for Post {
    const TABLE_NAME: &'static str = "posts";
    const TYPE_NAME: &'static str = "Post";
    const PRIMARY_KEY: KeyInfo = KeyInfo::auto("id");

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", SqlType::Integer)
                .primary_key(true)
                .auto_increment(true),
            FieldInfo::new("title", SqlType::Text),
            FieldInfo::new("author_id", SqlType::Integer)
                .nullable(true)
                .references("authors"),
            FieldInfo::new("meta_json", SqlType::Text).nullable(true),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::from(self.id)),
            ("title", Value::Text(self.title.clone())),
            ("author_id", Value::from(self.author_id)),
            ("meta_json", Value::from(self.meta_json.clone())),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            title: row.get_named("title")?,
            author_id: row.get_named("author_id")?,
            author: None,
            tags: None,
            meta: None,
            meta_json: row.get_named("meta_json")?,
        })
    }

    fn primary_key(&self) -> Value {
        Value::from(self.id)
    }

    fn set_primary_key(&mut self, key: Value) {
        self.id = key.as_i64();
    }

    fn get_column(&self, column: &str) -> Option<Value> {
        match column {
            "id" => Some(Value::from(self.id)),
            "title" => Some(Value::Text(self.title.clone())),
            "author_id" => Some(Value::from(self.author_id)),
            "meta_json" => Some(Value::from(self.meta_json.clone())),
            _ => None,
        }
    }

    fn set_column(&mut self, column: &str, value: Value) -> bool {
        match column {
            "id" => {
                self.id = value.as_i64();
                true
            }
            "title" => {
                self.title = value.as_str().unwrap_or_default().to_string();
                true
            }
            "author_id" => {
                self.author_id = value.as_i64();
                true
            }
            "meta_json" => {
                self.meta_json = value.as_str().map(ToString::to_string);
                true
            }
            _ => false,
        }
    }
}

pub struct PostAuthor;

impl ReferenceSpec for PostAuthor {
    type Owner = Post;
    type Target = Author;

    fn get(owner: &Post) -> Option<Obj<Author>> {
        owner.author.clone()
    }

    fn set(owner: &mut Post, value: Option<Obj<Author>>) {
        owner.author = value;
    }
}

pub struct PostTags;

impl CollectionSpec for PostTags {
    type Owner = Post;
    type Target = Tag;

    fn get(owner: &Post) -> Option<Vec<Obj<Tag>>> {
        owner.tags.clone()
    }

    fn set(owner: &mut Post, value: Option<Vec<Obj<Tag>>>) {
        owner.tags = value;
    }
}

pub struct PostMetaBlob;

impl BlobSpec for PostMetaBlob {
    type Owner = Post;

    const COLUMN: &'static str = "meta_json";

    fn pack(owner: &mut Post) -> Result<()> {
        owner.meta_json = match &owner.meta {
            Some(meta) => Some(blob::to_text(meta)?),
            None => None,
        };
        Ok(())
    }

    fn unpack(owner: &mut Post) -> Result<()> {
        owner.meta = match owner.meta_json.as_deref() {
            Some(text) => Some(blob::from_text(text)?),
            None => None,
        };
        Ok(())
    }
}

impl Related for Post {
    fn relations() -> &'static [Relation<Self>] {
        static RELATIONS: &[Relation<Post>] = &[
            Relation::many_to_one::<PostAuthor>("author").cascade(CascadeOps::READ),
            Relation::many_to_many::<PostTags, PostTag>("tags")
                .cascade(CascadeOps::READ.insert(true)),
            Relation::text_blob::<PostMetaBlob>("meta"),
        ];
        RELATIONS
    }
}

// ============================================================================
// Tag
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Tag {
    pub id: Option<i64>,
    pub label: String,
    // Fixed-size shape: exercises the Array collection materialization.
    pub posts: Option<Box<[Obj<Post>]>>,
}

impl Tag {
    pub fn labeled(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Self::default()
        }
    }
}

impl Model for Tag {
    const TABLE_NAME: &'static str = "tags";
    const TYPE_NAME: &'static str = "Tag";
    const PRIMARY_KEY: KeyInfo = KeyInfo::auto("id");

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", SqlType::Integer)
                .primary_key(true)
                .auto_increment(true),
            FieldInfo::new("label", SqlType::Text),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::from(self.id)),
            ("label", Value::Text(self.label.clone())),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            label: row.get_named("label")?,
            posts: None,
        })
    }

    fn primary_key(&self) -> Value {
        Value::from(self.id)
    }

    fn set_primary_key(&mut self, key: Value) {
        self.id = key.as_i64();
    }

    fn get_column(&self, column: &str) -> Option<Value> {
        match column {
            "id" => Some(Value::from(self.id)),
            "label" => Some(Value::Text(self.label.clone())),
            _ => None,
        }
    }

    fn set_column(&mut self, column: &str, value: Value) -> bool {
        match column {
            "id" => {
                self.id = value.as_i64();
                true
            }
            "label" => {
                self.label = value.as_str().unwrap_or_default().to_string();
                true
            }
            _ => false,
        }
    }
}

pub struct TagPosts;

impl CollectionSpec for TagPosts {
    type Owner = Tag;
    type Target = Post;

    fn get(owner: &Tag) -> Option<Vec<Obj<Post>>> {
        owner.posts.as_ref().map(|posts| posts.to_vec())
    }

    fn set(owner: &mut Tag, value: Option<Vec<Obj<Post>>>) {
        owner.posts = value.map(Vec::into_boxed_slice);
    }
}

impl Related for Tag {
    fn relations() -> &'static [Relation<Self>] {
        static RELATIONS: &[Relation<Tag>] = &[
            Relation::many_to_many::<TagPosts, PostTag>("posts")
                .shape(sqlweave::EnclosedShape::Array),
        ];
        RELATIONS
    }
}

// ============================================================================
// PostTag (intermediate)
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct PostTag {
    pub id: Option<i64>,
    pub post_id: i64,
    pub tag_id: i64,
}

impl Model for PostTag {
    const TABLE_NAME: &'static str = "post_tags";
    const TYPE_NAME: &'static str = "PostTag";
    const PRIMARY_KEY: KeyInfo = KeyInfo::auto("id");

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", SqlType::Integer)
                .primary_key(true)
                .auto_increment(true),
            FieldInfo::new("post_id", SqlType::Integer).references("posts"),
            FieldInfo::new("tag_id", SqlType::Integer).references("tags"),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::from(self.id)),
            ("post_id", Value::Integer(self.post_id)),
            ("tag_id", Value::Integer(self.tag_id)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            post_id: row.get_named("post_id")?,
            tag_id: row.get_named("tag_id")?,
        })
    }

    fn primary_key(&self) -> Value {
        Value::from(self.id)
    }

    fn set_primary_key(&mut self, key: Value) {
        self.id = key.as_i64();
    }

    fn get_column(&self, column: &str) -> Option<Value> {
        match column {
            "id" => Some(Value::from(self.id)),
            "post_id" => Some(Value::Integer(self.post_id)),
            "tag_id" => Some(Value::Integer(self.tag_id)),
            _ => None,
        }
    }

    fn set_column(&mut self, column: &str, value: Value) -> bool {
        match column {
            "id" => {
                self.id = value.as_i64();
                true
            }
            "post_id" => {
                self.post_id = value.as_i64().unwrap_or_default();
                true
            }
            "tag_id" => {
                self.tag_id = value.as_i64().unwrap_or_default();
                true
            }
            _ => false,
        }
    }
}
