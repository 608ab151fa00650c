#![allow(clippy::unwrap_used, clippy::expect_used)]

#[cfg(feature = "sqlite")]
mod common;

#[cfg(feature = "sqlite")]
mod tree_tests {
    use std::sync::Arc;

    use rowscope_db::{RepositoryFactory, Session, TreeSource};
    use rowscope_security::AuthorizationContext;
    use rowscope_tree::{ChildSource, TreeBuilder};
    use sea_orm::{ColumnTrait, Condition, Value};

    use crate::common::{ALICE, BOB, SeededSqlite, document, keys, session_for};

    fn levels(flat: &[(document::Model, usize)]) -> Vec<(i64, usize)> {
        flat.iter().map(|(row, level)| (row.id, *level)).collect()
    }

    fn sorted_ids(rows: &[document::Model]) -> Vec<i64> {
        let mut ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        ids.sort_unstable();
        ids
    }

    async fn eager_session(user: rowscope_security::UserId) -> Session {
        use rowscope_db::ConnectionFactory;
        let conn = SeededSqlite.connect().await.unwrap();
        Session::new(AuthorizationContext::for_user(user), conn, keys(), false)
    }

    #[tokio::test]
    async fn lazy_tree_follows_lookup_visibility() {
        let session = session_for(ALICE).await;
        let source = TreeSource::new(session.repository::<document::Entity>(), None);

        let roots = source.roots().await.unwrap();
        assert_eq!(sorted_ids(&roots), vec![1, 4]);

        let flat = TreeBuilder::new(&source).flatten_with_level(roots).await.unwrap();
        // Bob's inactive memo under "Budget" is not visible to Alice.
        assert_eq!(levels(&flat), vec![(1, 0), (2, 1), (6, 2), (3, 1), (4, 0)]);
    }

    #[tokio::test]
    async fn other_users_see_other_trees() {
        let session = session_for(BOB).await;
        let source = TreeSource::new(session.repository::<document::Entity>(), None);

        let roots = source.roots().await.unwrap();
        let flat = TreeBuilder::new(&source).flatten_with_level(roots).await.unwrap();
        assert_eq!(levels(&flat), vec![(1, 0), (2, 1), (6, 2), (4, 0), (5, 1)]);
    }

    #[tokio::test]
    async fn source_filter_narrows_every_level() {
        let session = session_for(ALICE).await;
        let active = Condition::all().add(document::Column::IsActive.eq(true));
        let source = TreeSource::new(session.repository::<document::Entity>(), Some(active));

        let roots = source.roots().await.unwrap();
        let flat = TreeBuilder::new(&source).flatten_with_level(roots).await.unwrap();
        assert_eq!(levels(&flat), vec![(1, 0), (2, 1), (6, 2), (4, 0)]);
    }

    #[tokio::test]
    async fn child_filter_prunes_subtrees() {
        let session = session_for(ALICE).await;
        let source = TreeSource::new(session.repository::<document::Entity>(), None);

        let roots = source.roots().await.unwrap();
        let flat = TreeBuilder::new(&source)
            .filter_children(|row: &document::Model| row.score > 40)
            .flatten_with_level(roots)
            .await
            .unwrap();
        assert_eq!(levels(&flat), vec![(1, 0), (2, 1), (6, 2), (4, 0)]);
    }

    #[tokio::test]
    async fn forest_keeps_parent_links() {
        let session = session_for(ALICE).await;
        let source = TreeSource::new(session.repository::<document::Entity>(), None);

        let roots = source.roots().await.unwrap();
        let forest = TreeBuilder::new(&source).forest(roots).await.unwrap();
        assert_eq!(forest.len(), 5);

        let retro = forest
            .preorder()
            .into_iter()
            .find(|node| node.data().id == 6)
            .unwrap();
        assert_eq!(retro.level(), 2);
        assert_eq!(retro.parent().unwrap().data().id, 2);
        assert!(retro.is_leaf());
    }

    #[tokio::test]
    async fn flat_tree_lists_expandable_nodes() {
        let session = session_for(ALICE).await;
        let source = TreeSource::new(session.repository::<document::Entity>(), None);

        let roots = source.roots().await.unwrap();
        let flat = TreeBuilder::new(&source).flat_tree(roots).await.unwrap();

        let entries: Vec<(i64, usize)> = flat.iter().map(|n| (n.data.id, n.level)).collect();
        assert_eq!(entries, vec![(1, 0), (2, 1), (4, 0)]);

        let children: Vec<(i64, bool)> = flat[0]
            .children
            .iter()
            .map(|c| (c.data.id, c.has_children))
            .collect();
        assert_eq!(children, vec![(2, true), (3, false)]);
        assert!(flat[2].children.is_empty());
    }

    #[tokio::test]
    async fn preload_makes_children_resident() {
        let session = session_for(ALICE).await;
        let docs = session.repository::<document::Entity>();
        let source = TreeSource::new(docs, None);

        let roots = source.roots().await.unwrap();
        assert!(source.resident(&roots[0]).is_none());

        source.preload(&roots).await.unwrap();
        let by_id = |id: i64| roots.iter().find(|r| r.id == id).unwrap();
        assert_eq!(sorted_ids(&source.resident(by_id(1)).unwrap()), vec![2, 3]);
        assert_eq!(source.resident(by_id(4)), Some(Vec::new()));

        let release_plan = docs.get_by_id(2).await.unwrap().unwrap();
        assert!(source.resident(&release_plan).is_none());
    }

    #[tokio::test]
    async fn eager_session_serves_the_tree_from_memory() {
        let session = eager_session(ALICE).await;
        let docs = session.repository::<document::Entity>();
        let source = TreeSource::new(docs, None);

        let roots = source.roots().await.unwrap();
        assert_eq!(sorted_ids(&roots), vec![1, 4]);

        // Rows deleted after the roots were read still show up: nothing is
        // fetched again.
        docs.execute_command(
            "DELETE FROM documents WHERE id = ?",
            vec![Value::BigInt(Some(6))],
        )
        .await
        .unwrap();

        let flat = TreeBuilder::new(&source).flatten_with_level(roots).await.unwrap();
        assert_eq!(levels(&flat), vec![(1, 0), (2, 1), (6, 2), (3, 1), (4, 0)]);
    }

    #[tokio::test]
    async fn reloading_replaces_resident_children() {
        let expected = vec![(1, 0), (2, 1), (6, 2), (3, 1), (4, 0)];

        let eager = eager_session(ALICE).await;
        let source = TreeSource::new(eager.repository::<document::Entity>(), None);
        let first = source.roots().await.unwrap();
        let forest = TreeBuilder::new(&source).forest(first).await.unwrap();
        assert_eq!(forest.len(), 5);
        let again = source.roots().await.unwrap();
        let flat = TreeBuilder::new(&source).flatten_with_level(again).await.unwrap();
        assert_eq!(levels(&flat), expected);

        let lazy = session_for(ALICE).await;
        let source = TreeSource::new(lazy.repository::<document::Entity>(), None);
        let roots = source.roots().await.unwrap();
        source.preload(&roots).await.unwrap();
        source.preload(&roots).await.unwrap();
        let roadmap = roots.iter().find(|r| r.id == 1).unwrap();
        assert_eq!(sorted_ids(&source.resident(roadmap).unwrap()), vec![2, 3]);
        let flat = TreeBuilder::new(&source).flatten_with_level(roots).await.unwrap();
        assert_eq!(levels(&flat), expected);
    }

    #[tokio::test]
    async fn lazy_session_fetches_on_demand() {
        let session = session_for(ALICE).await;
        let docs = session.repository::<document::Entity>();
        let source = TreeSource::new(docs, None);

        let roots = source.roots().await.unwrap();
        docs.execute_command(
            "DELETE FROM documents WHERE id = ?",
            vec![Value::BigInt(Some(6))],
        )
        .await
        .unwrap();

        let flat = TreeBuilder::new(&source).flatten_with_level(roots).await.unwrap();
        assert_eq!(levels(&flat), vec![(1, 0), (2, 1), (3, 1), (4, 0)]);
    }

    #[tokio::test]
    async fn factory_sessions_inherit_the_load_policy() {
        let factory = RepositoryFactory::builder()
            .connector(Arc::new(SeededSqlite))
            .keys(keys())
            .lazy_load(false)
            .build()
            .await
            .unwrap();
        let session = factory.get_by_user(ALICE).unwrap();
        assert!(!session.is_lazy_load());

        let source = TreeSource::new(session.repository::<document::Entity>(), None);
        let roots = source.roots().await.unwrap();
        assert!(source.resident(&roots[0]).is_some());
    }
}
