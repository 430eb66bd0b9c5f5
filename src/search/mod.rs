//! Tantivy-based search index module.
//!
//! Provides full-text search over projects and tasks with field boosting.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, QueryParser};
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::{text_enum, Project, Task};

const BOOST_TITLE: f32 = 10.0;
const BOOST_CODE: f32 = 8.0;
const BOOST_TAGS: f32 = 5.0;
const BOOST_DESCRIPTION: f32 = 3.0;

text_enum!(SearchKind {
    Project => "project",
    Task => "task",
});

/// A matching project or task with its relevance score.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub kind: SearchKind,
    pub id: String,
    pub title: String,
    /// Owning project, for tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub score: f32,
}

/// Search index schema fields.
struct SearchFields {
    key: Field,
    kind: Field,
    id: Field,
    project_id: Field,
    title: Field,
    code: Field,
    description: Field,
    tags: Field,
}

/// Tantivy search index for projects and tasks.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl SearchIndex {
    /// Create or open a search index at the specified path.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        let mut schema_builder = Schema::builder();
        // `kind:id`, indexed untokenized so single documents can be replaced
        let key = schema_builder.add_text_field("key", STRING);
        let kind = schema_builder.add_text_field("kind", STRING | STORED);
        let id = schema_builder.add_text_field("id", STORED);
        let project_id = schema_builder.add_text_field("project_id", STORED);
        let title = schema_builder.add_text_field("title", TEXT | STORED);
        let code = schema_builder.add_text_field("code", TEXT);
        let description = schema_builder.add_text_field("description", TEXT);
        let tags = schema_builder.add_text_field("tags", TEXT);
        let schema = schema_builder.build();

        let fields = SearchFields {
            key,
            kind,
            id,
            project_id,
            title,
            code,
            description,
            tags,
        };

        // Try to open existing index or create new one
        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema.clone()))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Rebuild the entire index from the stored projects and tasks.
    pub async fn rebuild(&self, projects: &[Project], tasks: &[Task]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_all_documents()?;

        for project in projects {
            writer.add_document(self.project_document(project))?;
        }
        for task in tasks {
            writer.add_document(self.task_document(task))?;
        }

        writer.commit()?;
        self.reader.reload()?;

        tracing::info!(
            projects = projects.len(),
            tasks = tasks.len(),
            "Search index rebuilt"
        );
        Ok(())
    }

    /// Index (or re-index) a single project.
    pub async fn index_project(&self, project: &Project) -> Result<(), AppError> {
        self.replace(
            document_key(SearchKind::Project, &project.id),
            Some(self.project_document(project)),
        )
        .await
    }

    /// Index (or re-index) a single task.
    pub async fn index_task(&self, task: &Task) -> Result<(), AppError> {
        self.replace(
            document_key(SearchKind::Task, &task.id),
            Some(self.task_document(task)),
        )
        .await
    }

    pub async fn remove(&self, kind: SearchKind, id: &str) -> Result<(), AppError> {
        self.replace(document_key(kind, id), None).await
    }

    async fn replace(&self, key: String, doc: Option<TantivyDocument>) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_term(Term::from_field_text(self.fields.key, &key));
        if let Some(doc) = doc {
            writer.add_document(doc)?;
        }
        writer.commit()?;

        self.reader.reload()?;
        Ok(())
    }

    /// Search projects and tasks matching the query.
    pub fn search(
        &self,
        query_str: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchHit>, AppError> {
        if query_str.trim().is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let query_parser = QueryParser::for_index(
            &self.index,
            vec![
                self.fields.title,
                self.fields.code,
                self.fields.description,
                self.fields.tags,
            ],
        );

        let base_query = query_parser
            .parse_query(query_str)
            .map_err(|e| AppError::Search(format!("Invalid search query: {}", e)))?;

        let mut subqueries: Vec<(Occur, Box<dyn tantivy::query::Query>)> = Vec::new();

        let field_queries = [
            (self.fields.title, BOOST_TITLE),
            (self.fields.code, BOOST_CODE),
            (self.fields.tags, BOOST_TAGS),
            (self.fields.description, BOOST_DESCRIPTION),
        ];

        for (field, boost) in field_queries {
            let field_parser = QueryParser::for_index(&self.index, vec![field]);
            if let Ok(field_query) = field_parser.parse_query(query_str) {
                let boosted = BoostQuery::new(field_query, boost);
                subqueries.push((Occur::Should, Box::new(boosted)));
            }
        }

        // Combine with OR semantics
        let combined_query = if subqueries.is_empty() {
            base_query
        } else {
            Box::new(BooleanQuery::new(subqueries))
        };

        let top_docs = searcher
            .search(&combined_query, &TopDocs::with_limit(limit + offset))
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let hits = top_docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(score, doc_address)| {
                let doc: TantivyDocument = searcher.doc(doc_address).ok()?;
                let text = |field: Field| {
                    doc.get_first(field)
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                };
                Some(SearchHit {
                    kind: SearchKind::parse(&text(self.fields.kind)?)?,
                    id: text(self.fields.id)?,
                    title: text(self.fields.title).unwrap_or_default(),
                    project_id: text(self.fields.project_id).filter(|p| !p.is_empty()),
                    score,
                })
            })
            .collect();

        Ok(hits)
    }

    fn project_document(&self, project: &Project) -> TantivyDocument {
        doc!(
            self.fields.key => document_key(SearchKind::Project, &project.id),
            self.fields.kind => SearchKind::Project.as_str(),
            self.fields.id => project.id.clone(),
            self.fields.project_id => project.id.clone(),
            self.fields.title => project.name.clone(),
            self.fields.code => project.code.clone(),
            self.fields.description => project.description.clone().unwrap_or_default(),
            self.fields.tags => project.tags.join(" ")
        )
    }

    fn task_document(&self, task: &Task) -> TantivyDocument {
        doc!(
            self.fields.key => document_key(SearchKind::Task, &task.id),
            self.fields.kind => SearchKind::Task.as_str(),
            self.fields.id => task.id.clone(),
            self.fields.project_id => task.project_id.clone(),
            self.fields.title => task.title.clone(),
            self.fields.code => String::new(),
            self.fields.description => task.description.clone().unwrap_or_default(),
            self.fields.tags => task.tags.join(" ")
        )
    }
}

fn document_key(kind: SearchKind, id: &str) -> String {
    format!("{}:{}", kind, id)
}
