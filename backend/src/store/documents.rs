use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::models::document::{Document, NewDocument};

use super::{ts, ts_column, Store, StoreError};

const DOCUMENT_COLUMNS: &str = "id, created_at, file_name, file_path, file_url, first_name, \
                                last_name, email, company, uploaded_by";

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        created_at: ts_column(row, 1)?,
        file_name: row.get(2)?,
        file_path: row.get(3)?,
        file_url: row.get(4)?,
        first_name: row.get(5)?,
        last_name: row.get(6)?,
        email: row.get(7)?,
        company: row.get(8)?,
        uploaded_by: row.get(9)?,
    })
}

impl Store {
    pub fn create_document(
        &self,
        new: NewDocument,
        now: DateTime<Utc>,
    ) -> Result<Document, StoreError> {
        let document = Document {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            file_name: new.file_name,
            file_path: new.file_path,
            file_url: new.file_url,
            first_name: new.first_name,
            last_name: new.last_name,
            email: new.email,
            company: new.company,
            uploaded_by: new.uploaded_by,
        };

        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO documents ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                DOCUMENT_COLUMNS
            ),
            params![
                document.id,
                ts(document.created_at),
                document.file_name,
                document.file_path,
                document.file_url,
                document.first_name,
                document.last_name,
                document.email,
                document.company,
                document.uploaded_by,
            ],
        )?;

        Ok(document)
    }

    /// All documents, newest first.
    pub fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM documents ORDER BY created_at DESC",
            DOCUMENT_COLUMNS
        ))?;
        let documents = stmt
            .query_map([], document_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(documents)
    }

    pub fn get_document(&self, document_id: &str) -> Result<Document, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
            params![document_id],
            document_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("document {}", document_id)))
    }

    pub fn delete_document(&self, document_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM documents WHERE id = ?1", params![document_id])?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn upload(name: &str) -> NewDocument {
        NewDocument {
            file_name: name.to_string(),
            file_path: format!("1717405200000-{}", name),
            file_url: format!("http://localhost:8080/storage/documents/1717405200000-{}", name),
            first_name: "Dana".to_string(),
            last_name: "Scully".to_string(),
            email: "dana@example.com".to_string(),
            company: None,
            uploaded_by: Some("u1".to_string()),
        }
    }

    #[test]
    fn test_document_lifecycle() {
        let store = Store::new(":memory:").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();

        let older = store.create_document(upload("a.pdf"), now).unwrap();
        let newer = store
            .create_document(upload("b.pdf"), now + Duration::seconds(5))
            .unwrap();

        let listed = store.list_documents().unwrap();
        assert_eq!(listed, vec![newer.clone(), older.clone()]);
        assert_eq!(store.get_document(&older.id).unwrap(), older);

        assert!(store.delete_document(&older.id).unwrap());
        assert!(!store.delete_document(&older.id).unwrap());
        assert!(matches!(
            store.get_document(&older.id),
            Err(StoreError::NotFound(_))
        ));
    }
}
