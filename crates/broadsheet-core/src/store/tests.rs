use super::*;
use chrono::TimeZone;
use tempfile::TempDir;

fn open_store() -> (ArticleStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = ArticleStore::open(dir.path().join("articles.redb")).unwrap();
    (store, dir)
}

fn published(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 0, 0).unwrap()
}

fn new_article(url: &str, source: &str, author: Option<&str>) -> NewArticle {
    NewArticle {
        url: url.to_string(),
        guid: Some(format!("guid-{url}")),
        title: format!("Title for {url}"),
        content: "The quick brown fox jumps over the lazy dog".to_string(),
        summary: None,
        source: source.to_string(),
        author: author.map(str::to_string),
        published_date: published(2024, 6, 1),
        fetched_date: published(2024, 6, 2),
        terms: vec![],
        tags: vec![],
    }
}

fn chunk(index: u32, text: &str) -> ChunkSpan {
    ChunkSpan {
        chunk_index: index,
        text: text.to_string(),
        word_count: word_count(text) as u32,
        start_position: 0,
    }
}

#[test]
fn upsert_assigns_sequential_ids_and_computes_word_count() {
    let (store, _dir) = open_store();
    let outcome = store
        .upsert_articles(vec![
            new_article("https://a.example/1", "A", None),
            new_article("https://a.example/2", "A", None),
        ])
        .unwrap();
    assert_eq!(outcome.inserted_ids, vec![1, 2]);
    assert_eq!(outcome.skipped, 0);

    let article = store.get_article(1).unwrap().unwrap();
    assert_eq!(article.word_count, 9);
    assert!(!article.indexed);
    assert!(!article.is_chunked);
}

#[test]
fn duplicate_urls_are_silently_dropped() {
    let (store, _dir) = open_store();
    store
        .upsert_articles(vec![new_article("https://a.example/1", "A", None)])
        .unwrap();
    let mut dup = new_article("https://a.example/1", "B", None);
    dup.guid = Some("different-guid".to_string());
    let outcome = store.upsert_articles(vec![dup]).unwrap();
    assert!(outcome.inserted_ids.is_empty());
    assert_eq!(outcome.skipped, 1);

    // Original row untouched
    assert_eq!(store.get_article(1).unwrap().unwrap().source, "A");
}

#[test]
fn duplicate_guids_are_silently_dropped() {
    let (store, _dir) = open_store();
    store
        .upsert_articles(vec![new_article("https://a.example/1", "A", None)])
        .unwrap();
    let mut dup = new_article("https://a.example/other", "A", None);
    dup.guid = Some("guid-https://a.example/1".to_string());
    let outcome = store.upsert_articles(vec![dup]).unwrap();
    assert_eq!(outcome.skipped, 1);
}

#[test]
fn batch_get_skips_missing_ids() {
    let (store, _dir) = open_store();
    store
        .upsert_articles(vec![new_article("https://a.example/1", "A", None)])
        .unwrap();
    let found = store.get_articles(&[1, 99]).unwrap();
    assert_eq!(found.len(), 1);
}

#[test]
fn replace_chunks_is_atomic_with_the_flag() {
    let (store, _dir) = open_store();
    store
        .upsert_articles(vec![new_article("https://a.example/1", "A", None)])
        .unwrap();

    store
        .replace_chunks(1, &[chunk(0, "first part"), chunk(1, "second part")])
        .unwrap();
    assert!(store.get_article(1).unwrap().unwrap().is_chunked);
    assert_eq!(store.get_all_chunks(1).unwrap().len(), 2);

    // Replacing with a single chunk removes the old rows
    store.replace_chunks(1, &[chunk(0, "only part")]).unwrap();
    let chunks = store.get_all_chunks(1).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "only part");

    // Clearing chunks resets the flag
    store.replace_chunks(1, &[]).unwrap();
    assert!(!store.get_article(1).unwrap().unwrap().is_chunked);
}

#[test]
fn replace_chunks_for_missing_article_fails() {
    let (store, _dir) = open_store();
    assert!(matches!(
        store.replace_chunks(42, &[chunk(0, "x")]),
        Err(StoreError::ArticleNotFound(42))
    ));
}

#[test]
fn get_chunks_by_index_set() {
    let (store, _dir) = open_store();
    store
        .upsert_articles(vec![new_article("https://a.example/1", "A", None)])
        .unwrap();
    store
        .replace_chunks(1, &[chunk(0, "zero"), chunk(1, "one"), chunk(2, "two")])
        .unwrap();
    let found = store.get_chunks(1, &[2, 0]).unwrap();
    assert_eq!(found.len(), 2);
    let texts: Vec<&str> = found.iter().map(|c| c.text.as_str()).collect();
    assert!(texts.contains(&"zero") && texts.contains(&"two"));
}

#[test]
fn mark_indexed_sets_version_and_unindexed_respects_it() {
    let (store, _dir) = open_store();
    store
        .upsert_articles(vec![
            new_article("https://a.example/1", "A", None),
            new_article("https://a.example/2", "A", None),
        ])
        .unwrap();

    assert_eq!(store.unindexed_articles("v2").unwrap().len(), 2);
    store.mark_indexed(1, "v2").unwrap();
    let pending = store.unindexed_articles("v2").unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, 2);

    // A version bump makes everything stale again
    assert_eq!(store.unindexed_articles("v3").unwrap().len(), 2);
}

#[test]
fn filter_candidates_applies_conjunctive_predicates() {
    let (store, _dir) = open_store();
    let mut by_woods = new_article("https://a.example/1", "In Defence", Some("Alan Woods"));
    by_woods.published_date = published(2024, 1, 1);
    let mut other = new_article("https://a.example/2", "Other Source", Some("Someone Else"));
    other.published_date = published(2010, 1, 1);
    store.upsert_articles(vec![by_woods, other]).unwrap();

    let spec = FilterSpec {
        author: Some("Alan Woods".to_string()),
        ..FilterSpec::default()
    };
    let now = published(2026, 8, 1);
    assert_eq!(store.filter_candidates(&[1, 2], &spec, now).unwrap(), vec![1]);

    let spec = FilterSpec {
        date_range: Some(crate::filters::DateRange::Decade(2010)),
        ..FilterSpec::default()
    };
    assert_eq!(store.filter_candidates(&[1, 2], &spec, now).unwrap(), vec![2]);

    // Empty spec passes everything through, missing ids dropped only when
    // predicates force a row lookup
    let spec = FilterSpec::default();
    assert_eq!(
        store.filter_candidates(&[1, 2], &spec, now).unwrap(),
        vec![1, 2]
    );
}

#[test]
fn sources_and_authors_count_indexed_articles_only() {
    let (store, _dir) = open_store();
    store
        .upsert_articles(vec![
            new_article("https://a.example/1", "In Defence", Some("Alan Woods")),
            new_article("https://a.example/2", "In Defence", Some("Alan Woods")),
            new_article("https://a.example/3", "Other", Some("Someone Else")),
        ])
        .unwrap();
    store.mark_indexed(1, "v1").unwrap();
    store.mark_indexed(2, "v1").unwrap();
    // Article 3 stays unindexed

    let sources = store.list_sources().unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].name, "In Defence");
    assert_eq!(sources[0].article_count, 2);

    let authors = store.top_authors(2).unwrap();
    assert_eq!(authors.len(), 1);
    assert_eq!(authors[0].name, "Alan Woods");

    assert!(store.top_authors(3).unwrap().is_empty());
}

#[test]
fn stats_reflect_store_contents() {
    let (store, _dir) = open_store();
    store
        .upsert_articles(vec![
            new_article("https://a.example/1", "A", None),
            new_article("https://a.example/2", "B", None),
        ])
        .unwrap();
    store.mark_indexed(1, "v1").unwrap();
    store.replace_chunks(1, &[chunk(0, "a"), chunk(1, "b")]).unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.total_articles, 2);
    assert_eq!(stats.indexed_articles, 1);
    assert_eq!(stats.chunked_articles, 1);
    assert_eq!(stats.total_chunks, 2);
    assert_eq!(stats.sources_count, 1);
    assert!(stats.earliest_article.is_some());
}

#[test]
fn feed_records_round_trip() {
    let (store, _dir) = open_store();
    let feed = FeedRecord {
        url: "https://a.example/rss".to_string(),
        name: "In Defence".to_string(),
        status: FeedStatus::Active,
        last_checked: Some(published(2026, 7, 1)),
        consecutive_failures: 0,
        article_count: 120,
    };
    store.upsert_feed(&feed).unwrap();

    let mut updated = feed.clone();
    updated.status = FeedStatus::Degraded;
    updated.consecutive_failures = 4;
    store.upsert_feed(&updated).unwrap();

    let feeds = store.list_feeds().unwrap();
    assert_eq!(feeds.len(), 1);
    assert_eq!(feeds[0].status, FeedStatus::Degraded);
}

#[test]
fn store_persists_across_reopens() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("articles.redb");
    {
        let store = ArticleStore::open(&path).unwrap();
        store
            .upsert_articles(vec![new_article("https://a.example/1", "A", None)])
            .unwrap();
        store.replace_chunks(1, &[chunk(0, "persisted")]).unwrap();
    }
    {
        let store = ArticleStore::open(&path).unwrap();
        assert!(store.get_article(1).unwrap().is_some());
        assert_eq!(store.get_all_chunks(1).unwrap()[0].text, "persisted");
        // Id allocation continues after the existing rows
        let outcome = store
            .upsert_articles(vec![new_article("https://a.example/2", "A", None)])
            .unwrap();
        assert_eq!(outcome.inserted_ids, vec![2]);
    }
}
