#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use rowscope_db::{
    ConnectOpts, ConnectionFactory, DbError, KeyRegistry, RepositoryFactory, Session, connect,
};
use rowscope_security::{AuthorizationContext, FixedUserIdProvider, UserId};
use sea_orm::{ConnectionTrait, DatabaseConnection};

pub const ALICE: UserId = UserId::new(10);
pub const BOB: UserId = UserId::new(11);

pub mod document {
    use rowscope_db::{AuditColumns, EntityPolicy, FieldError, RepoError, RepoResult, SelfReferencing};
    use rowscope_security::AuthorizationContext;
    use sea_orm::entity::prelude::*;
    use sea_orm::{ActiveValue, Condition};

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "documents")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub owner_id: i64,
        pub title: String,
        pub is_active: bool,
        pub score: i32,
        pub parent_id: Option<i64>,
        pub last_editor_id: Option<i64>,
        pub created_at: Option<DateTimeUtc>,
        pub edited_at: Option<DateTimeUtc>,
        pub row_version: i64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::comment::Entity")]
        Comment,
    }

    impl Related<super::comment::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Comment.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}

    impl EntityPolicy for Entity {
        fn edit_scope(ctx: &AuthorizationContext) -> Condition {
            Condition::all().add(Column::OwnerId.eq(ctx.user_id().get()))
        }

        fn lookup_scope(ctx: &AuthorizationContext) -> Condition {
            Condition::any()
                .add(Column::IsActive.eq(true))
                .add(Column::OwnerId.eq(ctx.user_id().get()))
        }

        fn audit_columns() -> Option<AuditColumns<Self>> {
            Some(AuditColumns {
                last_editor: Column::LastEditorId,
                created_at: Column::CreatedAt,
                edited_at: Column::EditedAt,
                row_version: Some(Column::RowVersion),
            })
        }

        fn validate(model: &ActiveModel) -> Vec<FieldError> {
            match &model.title {
                ActiveValue::Set(title) | ActiveValue::Unchanged(title) if title.trim().is_empty() => {
                    vec![FieldError::new("Title", "must not be empty")]
                }
                _ => Vec::new(),
            }
        }

        fn before_remove(_ctx: &AuthorizationContext, row: &Model) -> RepoResult<()> {
            if row.title == "locked" {
                return Err(RepoError::rejected("documents", "locked documents cannot be removed"));
            }
            Ok(())
        }
    }

    impl SelfReferencing for Entity {
        fn parent_column() -> Column {
            Column::ParentId
        }
    }

    pub fn new(owner: i64, title: &str) -> ActiveModel {
        ActiveModel {
            owner_id: ActiveValue::Set(owner),
            title: ActiveValue::Set(title.to_owned()),
            is_active: ActiveValue::Set(true),
            score: ActiveValue::Set(0),
            ..Default::default()
        }
    }
}

pub mod comment {
    use rowscope_db::EntityPolicy;
    use rowscope_security::AuthorizationContext;
    use sea_orm::Condition;
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "comments")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub document_id: i64,
        pub author_id: i64,
        pub body: String,
        pub is_hidden: bool,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::document::Entity",
            from = "Column::DocumentId",
            to = "super::document::Column::Id"
        )]
        Document,
    }

    impl Related<super::document::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Document.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}

    impl EntityPolicy for Entity {
        fn edit_scope(ctx: &AuthorizationContext) -> Condition {
            Condition::all().add(Column::AuthorId.eq(ctx.user_id().get()))
        }

        fn lookup_scope(_ctx: &AuthorizationContext) -> Condition {
            Condition::all().add(Column::IsHidden.eq(false))
        }
    }
}

/// Composite-key entity: one label per (document, name).
pub mod tag {
    use rowscope_db::EntityPolicy;
    use rowscope_security::AuthorizationContext;
    use sea_orm::Condition;
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "tags")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub document_id: i64,
        #[sea_orm(primary_key, auto_increment = false)]
        pub name: String,
        pub owner_id: i64,
        pub color: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl EntityPolicy for Entity {
        fn edit_scope(ctx: &AuthorizationContext) -> Condition {
            Condition::all().add(Column::OwnerId.eq(ctx.user_id().get()))
        }
    }
}

const SCHEMA: &str = r"
CREATE TABLE documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT 1,
    score INTEGER NOT NULL DEFAULT 0,
    parent_id INTEGER NULL,
    last_editor_id INTEGER NULL,
    created_at TEXT NULL,
    edited_at TEXT NULL,
    row_version INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id),
    author_id INTEGER NOT NULL,
    body TEXT NOT NULL,
    is_hidden BOOLEAN NOT NULL DEFAULT 0
);
CREATE TABLE tags (
    document_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    owner_id INTEGER NOT NULL,
    color TEXT NOT NULL,
    PRIMARY KEY (document_id, name)
);
";

/// Seed rows:
///
/// | id | owner | title        | active | score | parent |
/// |----|-------|--------------|--------|-------|--------|
/// | 1  | alice | Roadmap      | yes    | 40    | -      |
/// | 2  | alice | Release plan | yes    | 45    | 1      |
/// | 3  | alice | Draft notes  | no     | 7     | 1      |
/// | 4  | bob   | Budget       | yes    | 12    | -      |
/// | 5  | bob   | Private memo | no     | 3     | 4      |
/// | 6  | alice | Retro        | yes    | 41    | 2      |
const SEED: &str = r"
INSERT INTO documents (id, owner_id, title, is_active, score, parent_id) VALUES
    (1, 10, 'Roadmap', 1, 40, NULL),
    (2, 10, 'Release plan', 1, 45, 1),
    (3, 10, 'Draft notes', 0, 7, 1),
    (4, 11, 'Budget', 1, 12, NULL),
    (5, 11, 'Private memo', 0, 3, 4),
    (6, 10, 'Retro', 1, 41, 2);
INSERT INTO comments (id, document_id, author_id, body, is_hidden) VALUES
    (1, 1, 11, 'Looks good', 0),
    (2, 1, 10, 'Internal remark', 1),
    (3, 4, 10, 'Numbers?', 0);
INSERT INTO tags (document_id, name, owner_id, color) VALUES
    (1, 'planning', 10, 'blue'),
    (4, 'finance', 11, 'green');
";

/// In-memory `SQLite` with the test schema and seed rows.
pub struct SeededSqlite;

#[async_trait]
impl ConnectionFactory for SeededSqlite {
    async fn connect(&self) -> Result<DatabaseConnection, DbError> {
        let opts = ConnectOpts {
            max_conns: Some(1),
            ..Default::default()
        };
        let conn = connect("sqlite::memory:", &opts).await?;
        conn.execute_unprepared(SCHEMA).await?;
        conn.execute_unprepared(SEED).await?;
        Ok(conn)
    }
}

pub fn keys() -> Arc<KeyRegistry> {
    Arc::new(KeyRegistry::new().with::<tag::Entity>())
}

pub async fn factory_for(user: UserId) -> RepositoryFactory {
    RepositoryFactory::builder()
        .connector(Arc::new(SeededSqlite))
        .users(Arc::new(FixedUserIdProvider(user)))
        .keys(keys())
        .build()
        .await
        .expect("factory")
}

/// Stand-alone session over a fresh seeded database.
pub async fn session_for(user: UserId) -> Session {
    let conn = SeededSqlite.connect().await.expect("connect");
    Session::new(AuthorizationContext::for_user(user), conn, keys(), true)
}
