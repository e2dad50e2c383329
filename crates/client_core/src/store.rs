//! In-memory course listing shared with the views.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use reqwest::{cookie::Jar, Client};
use shared::domain::{Course, CourseCreateData};
use tokio::sync::RwLock;
use tracing::error;

use crate::{
    error::ApiError,
    transport::{build_http_client, execute_json, ClientSettings},
};

#[async_trait]
pub trait CourseBackend: Send + Sync {
    async fn list_courses(&self) -> Result<Vec<Course>, ApiError>;
    async fn create_course(&self, data: &CourseCreateData) -> Result<Course, ApiError>;
}

/// Talks to `/api/courses` with its own HTTP client rather than through
/// [`crate::ApiClient`].
pub struct HttpCourseBackend {
    http: Client,
    courses_url: String,
}

impl HttpCourseBackend {
    pub fn new(settings: &ClientSettings, cookies: Arc<Jar>) -> Result<Self, ApiError> {
        Ok(Self {
            http: build_http_client(settings, cookies, true)?,
            courses_url: format!("{}/api/courses", settings.origin()),
        })
    }
}

#[async_trait]
impl CourseBackend for HttpCourseBackend {
    async fn list_courses(&self) -> Result<Vec<Course>, ApiError> {
        execute_json(&self.http, self.http.get(&self.courses_url)).await
    }

    async fn create_course(&self, data: &CourseCreateData) -> Result<Course, ApiError> {
        execute_json(&self.http, self.http.post(&self.courses_url).json(data)).await
    }
}

/// Clears the loading flag however the fetch ends.
struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn engage(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Course listing plus a loading flag. Only its own two actions write to it.
pub struct CourseStore {
    backend: Arc<dyn CourseBackend>,
    courses: RwLock<Vec<Course>>,
    loading: AtomicBool,
}

impl CourseStore {
    pub fn new(backend: Arc<dyn CourseBackend>) -> Self {
        Self {
            backend,
            courses: RwLock::new(Vec::new()),
            loading: AtomicBool::new(false),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub async fn courses(&self) -> Vec<Course> {
        self.courses.read().await.clone()
    }

    /// Replaces the local listing with the backend's, wholesale.
    pub async fn fetch_courses(&self) -> Result<Vec<Course>, ApiError> {
        let _loading = LoadingGuard::engage(&self.loading);
        match self.backend.list_courses().await {
            Ok(courses) => {
                *self.courses.write().await = courses.clone();
                Ok(courses)
            }
            Err(err) => {
                error!(error = %err, "failed to load courses");
                Err(err)
            }
        }
    }

    /// Appends the record the backend created; the listing is not refetched.
    pub async fn create_course(&self, data: &CourseCreateData) -> Result<Course, ApiError> {
        match self.backend.create_course(data).await {
            Ok(course) => {
                self.courses.write().await.push(course.clone());
                Ok(course)
            }
            Err(err) => {
                error!(error = %err, title = %data.title, "failed to create course");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
