use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{ClassroomError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
}

/// Read-only view of the external user and course stores.
///
/// `Ok(None)` means the record does not exist; `Err` means the store itself
/// could not answer.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Returns the admin's username
    async fn find_admin(&self, id: &str) -> Result<Option<String>>;

    /// Returns the assistant's name
    async fn find_assistant(&self, id: &str) -> Result<Option<String>>;

    /// Returns the student's name
    async fn find_student(&self, id: &str) -> Result<Option<String>>;

    async fn find_course(&self, id: &str) -> Result<Option<Course>>;
}

#[derive(Debug, Clone, Deserialize)]
struct PersonRecord {
    id: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    admins: Vec<PersonRecord>,
    #[serde(default)]
    assistants: Vec<PersonRecord>,
    #[serde(default)]
    students: Vec<PersonRecord>,
    #[serde(default)]
    courses: Vec<Course>,
}

/// In-memory directory, seeded from a JSON file or built up in code.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    admins: HashMap<String, String>,
    assistants: HashMap<String, String>,
    students: HashMap<String, String>,
    courses: HashMap<String, Course>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a directory file of the form
    /// `{"admins":[{id,name}], "assistants":[..], "students":[..], "courses":[{id,title}]}`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            ClassroomError::InvalidConfiguration(format!(
                "cannot read directory file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: DirectoryFile = serde_json::from_str(raw)?;
        let people = |records: Vec<PersonRecord>| {
            records
                .into_iter()
                .map(|r| (r.id, r.name))
                .collect::<HashMap<_, _>>()
        };

        Ok(Self {
            admins: people(file.admins),
            assistants: people(file.assistants),
            students: people(file.students),
            courses: file
                .courses
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
        })
    }

    pub fn with_admin(mut self, id: impl Into<String>, username: impl Into<String>) -> Self {
        self.admins.insert(id.into(), username.into());
        self
    }

    pub fn with_assistant(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.assistants.insert(id.into(), name.into());
        self
    }

    pub fn with_student(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.students.insert(id.into(), name.into());
        self
    }

    pub fn with_course(mut self, id: impl Into<String>, title: impl Into<String>) -> Self {
        let id = id.into();
        self.courses.insert(
            id.clone(),
            Course {
                id,
                title: title.into(),
            },
        );
        self
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn find_admin(&self, id: &str) -> Result<Option<String>> {
        Ok(self.admins.get(id).cloned())
    }

    async fn find_assistant(&self, id: &str) -> Result<Option<String>> {
        Ok(self.assistants.get(id).cloned())
    }

    async fn find_student(&self, id: &str) -> Result<Option<String>> {
        Ok(self.students.get(id).cloned())
    }

    async fn find_course(&self, id: &str) -> Result<Option<Course>> {
        Ok(self.courses.get(id).cloned())
    }
}
