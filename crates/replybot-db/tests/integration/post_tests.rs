use replybot_core::models::{Category, NormalizedRecord, SourceKind};
use replybot_core::traits::RecordSink;
use replybot_db::{Database, PostRepository};

use crate::common::setup_test_db;

fn record(id: &str, category: Category) -> NormalizedRecord {
    NormalizedRecord::new(
        id,
        format!("https://bsky.app/profile/a.bsky.social/post/{id}"),
        "Wordle 1,236 4/6",
        SourceKind::Bluesky,
        category,
    )
    .unwrap()
}

#[tokio::test]
async fn append_and_read_back() {
    let (pool, _container) = setup_test_db().await;
    let repo = PostRepository::new(pool);

    let id = repo.append(&record("bafy1", Category::Wordle)).await.unwrap();
    assert!(!id.is_nil());

    let posts = repo.recent(10, None).await.unwrap();
    assert_eq!(posts.len(), 1);
    let post = &posts[0];
    assert_eq!(post.id, id);
    assert_eq!(post.post_id, "bafy1");
    assert_eq!(post.url, "https://bsky.app/profile/a.bsky.social/post/bafy1");
    assert_eq!(post.category, Category::Wordle);
    assert_eq!(post.source, SourceKind::Bluesky);
    assert!(!post.responded);
}

#[tokio::test]
async fn recent_is_newest_first_and_filters_by_category() {
    let (pool, _container) = setup_test_db().await;
    let repo = Database::from_pool(pool).post_repo();

    repo.append(&record("a", Category::Wordle)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    repo.append(&record("b", Category::Cooking)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    repo.append(&record("c", Category::Wordle)).await.unwrap();

    let all: Vec<String> = repo
        .recent(10, None)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.post_id)
        .collect();
    assert_eq!(all, vec!["c", "b", "a"]);

    let wordle: Vec<String> = repo
        .recent(10, Some(Category::Wordle))
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.post_id)
        .collect();
    assert_eq!(wordle, vec!["c", "a"]);

    assert_eq!(repo.recent(1, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn oversized_limit_is_clamped() {
    let (pool, _container) = setup_test_db().await;
    let repo = Database::from_pool(pool).post_repo();

    repo.append(&record("a", Category::Crossword)).await.unwrap();
    repo.append(&record("b", Category::Connections)).await.unwrap();

    let posts = repo.recent(usize::MAX, None).await.unwrap();
    assert_eq!(posts.len(), 2);
}

#[tokio::test]
async fn duplicates_are_not_rejected() {
    let (pool, _container) = setup_test_db().await;
    let repo = PostRepository::new(pool);

    let first = record("same", Category::Strands);
    RecordSink::append(&repo, &first).await.unwrap();
    RecordSink::append(&repo, &first).await.unwrap();

    assert_eq!(repo.recent(10, None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn health_check_succeeds() {
    let (pool, _container) = setup_test_db().await;
    PostRepository::new(pool).health_check().await.unwrap();
}
