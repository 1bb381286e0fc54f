//! Template Store & Retriever (C2).
//!
//! Metadata is persisted durably in the trace store's SQLite database
//! (mirroring `backend/src/patterns/storage.rs`'s SQLite-row-per-record
//! shape); embeddings are cached in memory and rebuilt on reindex, the same
//! "durable metadata, ephemeral vector cache" split Mira draws between
//! SQLite and Qdrant, minus the vector database dependency spec.md
//! explicitly puts out of scope.

mod parser;
mod retriever;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::warn;

use crate::inference::InferenceClient;

/// The stable, documented fallback template id (spec.md §4.2 / SPEC_FULL §4.2).
pub const FALLBACK_TEMPLATE_ID: &str = "general-reasoning";

/// A stored reasoning template.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub domain: Option<String>,
    pub complexity: Option<String>,
    pub methodology: Option<String>,
    pub keywords: Vec<String>,
    pub description: String,
    pub body: String,
    pub use_count: i64,
}

/// A template returned from `search`, carrying the similarity score that
/// produced its ranking.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRef {
    pub id: String,
    pub name: String,
    pub score: f32,
    pub description: String,
    pub body: String,
}

impl Template {
    fn as_ref_with_score(&self, score: f32) -> TemplateRef {
        TemplateRef {
            id: self.id.clone(),
            name: self.name.clone(),
            score,
            description: self.description.clone(),
            body: self.body.clone(),
        }
    }

    /// The composite string embedded for retrieval: name, description,
    /// keywords, domain, methodology, and a truncated body prefix.
    fn composite_text(&self) -> String {
        const BODY_PREFIX_CHARS: usize = 400;
        let body_prefix: String = self.body.chars().take(BODY_PREFIX_CHARS).collect();
        format!(
            "{}\n{}\nkeywords: {}\ndomain: {}\nmethodology: {}\n{}",
            self.name,
            self.description,
            self.keywords.join(", "),
            self.domain.as_deref().unwrap_or(""),
            self.methodology.as_deref().unwrap_or(""),
            body_prefix,
        )
    }
}

struct Entry {
    template: Template,
    embedding: Vec<f32>,
}

pub struct TemplateStore {
    pool: SqlitePool,
    inference: Arc<dyn InferenceClient>,
    embedding_model: String,
    entries: RwLock<Vec<Entry>>,
}

impl TemplateStore {
    pub fn new(pool: SqlitePool, inference: Arc<dyn InferenceClient>, embedding_model: String) -> Self {
        Self {
            pool,
            inference,
            embedding_model,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS templates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                domain TEXT,
                complexity TEXT,
                methodology TEXT,
                keywords TEXT NOT NULL,
                description TEXT NOT NULL,
                body TEXT NOT NULL,
                use_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn embed_template(&self, template: &Template) -> anyhow::Result<Vec<f32>> {
        self.inference
            .embed(&self.embedding_model, &template.composite_text())
            .await
            .map_err(|e| anyhow::anyhow!("embedding failed for template {}: {e}", template.id))
    }

    /// Scan `directories` for template source files, upsert each by slug of
    /// name, delete durable rows whose source is gone, and replace prior
    /// embeddings. Idempotent: repeating with unchanged inputs yields the
    /// same index (P6). A template removed from disk is removed from the
    /// store on the next reindex, matching §3's documented deletion rule.
    pub async fn reindex(&self, directories: &[PathBuf]) -> anyhow::Result<usize> {
        let mut parsed = Vec::new();
        for dir in directories {
            scan_directory(dir, &mut parsed);
        }

        let mut entries = Vec::with_capacity(parsed.len());
        let mut scanned_ids = Vec::with_capacity(parsed.len());
        for (id, p) in parsed {
            scanned_ids.push(id.clone());
            let template = Template {
                id: id.clone(),
                name: p.name,
                domain: p.domain,
                complexity: p.complexity,
                methodology: p.methodology,
                keywords: p.keywords,
                description: p.description,
                body: p.body,
                use_count: self.existing_use_count(&id).await,
            };
            self.upsert_row(&template).await?;
            let embedding = self.embed_template(&template).await?;
            entries.push(Entry { template, embedding });
        }
        self.delete_missing(&scanned_ids).await?;

        let count = entries.len();
        *self.entries.write().await = entries;
        Ok(count)
    }

    async fn existing_use_count(&self, id: &str) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT use_count FROM templates WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .unwrap_or(0)
    }

    /// Delete every durable row whose id is absent from `kept_ids`, so a
    /// template whose source file was removed doesn't resurrect its old
    /// `use_count` (or the template itself) on a later reindex.
    async fn delete_missing(&self, kept_ids: &[String]) -> anyhow::Result<()> {
        let existing: Vec<String> = sqlx::query_scalar("SELECT id FROM templates").fetch_all(&self.pool).await?;
        for id in existing {
            if !kept_ids.contains(&id) {
                sqlx::query("DELETE FROM templates WHERE id = ?").bind(&id).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    async fn upsert_row(&self, t: &Template) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO templates (id, name, domain, complexity, methodology, keywords, description, body, use_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                domain = excluded.domain,
                complexity = excluded.complexity,
                methodology = excluded.methodology,
                keywords = excluded.keywords,
                description = excluded.description,
                body = excluded.body
            "#,
        )
        .bind(&t.id)
        .bind(&t.name)
        .bind(&t.domain)
        .bind(&t.complexity)
        .bind(&t.methodology)
        .bind(t.keywords.join(","))
        .bind(&t.description)
        .bind(&t.body)
        .bind(t.use_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Parse and index a single template file.
    pub async fn add_one(&self, path: &Path) -> anyhow::Result<String> {
        let source = std::fs::read_to_string(path)?;
        let parsed = parser::parse(&source).map_err(|e| anyhow::anyhow!("{e}"))?;
        let id = parser::slugify(&parsed.name);
        let template = Template {
            id: id.clone(),
            name: parsed.name,
            domain: parsed.domain,
            complexity: parsed.complexity,
            methodology: parsed.methodology,
            keywords: parsed.keywords,
            description: parsed.description,
            body: parsed.body,
            use_count: self.existing_use_count(&id).await,
        };
        self.upsert_row(&template).await?;
        let embedding = self.embed_template(&template).await?;

        let mut entries = self.entries.write().await;
        entries.retain(|e| e.template.id != id);
        entries.push(Entry { template, embedding });
        Ok(id)
    }

    pub async fn list(&self) -> Vec<Template> {
        self.entries.read().await.iter().map(|e| e.template.clone()).collect()
    }

    pub async fn record_use(&self, id: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE templates SET use_count = use_count + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.template.id == id) {
            entry.template.use_count += 1;
        }
        Ok(())
    }

    /// Embed `query` and return the top `k` templates by descending
    /// similarity whose score meets `similarity_floor`, ties broken by
    /// lexicographic id order. Falls back to the designated fallback
    /// template (score 0.5) when nothing passes the floor.
    pub async fn search(
        &self,
        query: &str,
        embedding_model: &str,
        k: usize,
        similarity_floor: f32,
    ) -> anyhow::Result<Vec<TemplateRef>> {
        let query_embedding = self
            .inference
            .embed(embedding_model, query)
            .await
            .map_err(|e| anyhow::anyhow!("query embedding failed: {e}"))?;

        let entries = self.entries.read().await;
        let mut scored: Vec<(f32, &Entry)> = entries
            .iter()
            .map(|e| (retriever::similarity_score(&query_embedding, &e.embedding), e))
            .filter(|(score, _)| *score >= similarity_floor)
            .collect();

        scored.sort_by(|(score_a, a), (score_b, b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.template.id.cmp(&b.template.id))
        });

        if scored.is_empty() {
            if let Some(fallback) = entries.iter().find(|e| e.template.id == FALLBACK_TEMPLATE_ID) {
                return Ok(vec![fallback.template.as_ref_with_score(0.5)]);
            }
            warn!("no templates passed the similarity floor and no fallback template is indexed");
            return Ok(Vec::new());
        }

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, e)| e.template.as_ref_with_score(score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::testing::FakeInferenceClient;

    async fn open_store() -> (TemplateStore, tempfile::TempDir) {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let db_path = tempdir.path().join("templates-test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect(&url)
            .await
            .expect("open pool");
        let inference: Arc<dyn InferenceClient> = Arc::new(FakeInferenceClient::new(Vec::new()));
        let store = TemplateStore::new(pool, inference, "fake-embed".to_string());
        store.migrate().await.expect("migrate");
        (store, tempdir)
    }

    fn write_template(dir: &Path, filename: &str, name: &str) {
        std::fs::write(
            dir.join(filename),
            format!("---\nname: {name}\ndomain: testing\ndescription: a test template\n---\nBody for {name}.\n"),
        )
        .expect("write template");
    }

    #[tokio::test]
    async fn reindexing_an_unchanged_directory_is_idempotent() {
        let (store, tempdir) = open_store().await;
        let template_dir = tempdir.path().join("templates");
        std::fs::create_dir_all(&template_dir).expect("create dir");
        write_template(&template_dir, "a.md", "Alpha Template");
        write_template(&template_dir, "b.md", "Beta Template");

        let first = store.reindex(&[template_dir.clone()]).await.expect("first reindex");
        let mut first_ids: Vec<String> = store.list().await.into_iter().map(|t| t.id).collect();
        first_ids.sort();

        let second = store.reindex(&[template_dir.clone()]).await.expect("second reindex");
        let mut second_ids: Vec<String> = store.list().await.into_iter().map(|t| t.id).collect();
        second_ids.sort();

        assert_eq!(first, second);
        assert_eq!(first_ids, second_ids);
        assert_eq!(first_ids, vec!["alpha-template".to_string(), "beta-template".to_string()]);

        let row_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM templates")
            .fetch_one(&store.pool)
            .await
            .expect("count rows");
        assert_eq!(row_count, 2, "reindexing twice must not duplicate rows");
    }

    #[tokio::test]
    async fn reindex_preserves_use_count_across_runs() {
        let (store, tempdir) = open_store().await;
        let template_dir = tempdir.path().join("templates");
        std::fs::create_dir_all(&template_dir).expect("create dir");
        write_template(&template_dir, "a.md", "Alpha Template");

        store.reindex(&[template_dir.clone()]).await.expect("first reindex");
        store.record_use("alpha-template").await.expect("record use");

        store.reindex(&[template_dir.clone()]).await.expect("second reindex");
        let alpha = store
            .list()
            .await
            .into_iter()
            .find(|t| t.id == "alpha-template")
            .expect("alpha template still indexed");
        assert_eq!(alpha.use_count, 1, "use count must survive a reindex");
    }

    #[tokio::test]
    async fn removing_a_source_file_deletes_it_on_the_next_reindex() {
        let (store, tempdir) = open_store().await;
        let template_dir = tempdir.path().join("templates");
        std::fs::create_dir_all(&template_dir).expect("create dir");
        write_template(&template_dir, "a.md", "Alpha Template");
        write_template(&template_dir, "b.md", "Beta Template");
        store.reindex(&[template_dir.clone()]).await.expect("first reindex");

        std::fs::remove_file(template_dir.join("b.md")).expect("remove file");
        store.reindex(&[template_dir.clone()]).await.expect("second reindex");

        let ids: Vec<String> = store.list().await.into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["alpha-template".to_string()]);

        let row_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM templates")
            .fetch_one(&store.pool)
            .await
            .expect("count rows");
        assert_eq!(row_count, 1, "the durable row for the removed template must be gone");
    }

    #[tokio::test]
    async fn a_readded_template_does_not_resurrect_its_old_use_count() {
        let (store, tempdir) = open_store().await;
        let template_dir = tempdir.path().join("templates");
        std::fs::create_dir_all(&template_dir).expect("create dir");
        write_template(&template_dir, "a.md", "Alpha Template");
        store.reindex(&[template_dir.clone()]).await.expect("first reindex");
        store.record_use("alpha-template").await.expect("record use");

        std::fs::remove_file(template_dir.join("a.md")).expect("remove file");
        store.reindex(&[template_dir.clone()]).await.expect("reindex after removal");
        assert!(store.list().await.is_empty(), "removed template must not remain indexed");

        write_template(&template_dir, "a.md", "Alpha Template");
        store.reindex(&[template_dir.clone()]).await.expect("reindex after re-adding");
        let alpha = store
            .list()
            .await
            .into_iter()
            .find(|t| t.id == "alpha-template")
            .expect("alpha template reindexed");
        assert_eq!(alpha.use_count, 0, "a re-added template must start with a fresh use count");
    }
}

struct ParsedWithPath {
    name: String,
    domain: Option<String>,
    complexity: Option<String>,
    methodology: Option<String>,
    keywords: Vec<String>,
    description: String,
    body: String,
}

fn scan_directory(dir: &Path, out: &mut Vec<(String, ParsedWithPath)>) {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        warn!(dir = %dir.display(), "template directory not readable, skipping");
        return;
    };
    for entry in read_dir.flatten() {
        let path = entry.path();
        if path.is_dir() {
            scan_directory(&path, out);
            continue;
        }
        let Ok(source) = std::fs::read_to_string(&path) else {
            continue;
        };
        match parser::parse(&source) {
            Ok(p) => {
                let id = parser::slugify(&p.name);
                out.push((
                    id,
                    ParsedWithPath {
                        name: p.name,
                        domain: p.domain,
                        complexity: p.complexity,
                        methodology: p.methodology,
                        keywords: p.keywords,
                        description: p.description,
                        body: p.body,
                    },
                ));
            }
            Err(e) => warn!(file = %path.display(), error = %e, "skipping unparsable template"),
        }
    }
}
