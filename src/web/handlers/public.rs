use crate::backend::{EXTERNAL_MARKET, Lesson, Module};
use crate::content;
use crate::web::{
    AppState, Visitor,
    views::{
        self, AboutPage, EducationPage, LandingPage, LessonLink, LessonView, ModuleView,
        NotFoundPage, ProgressView,
    },
};
use axum::{
    Extension,
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::error;
use uuid::Uuid;

pub async fn landing(Extension(visitor): Extension<Visitor>) -> Response {
    views::render(&LandingPage {
        toasts: visitor.take_notifications(),
    })
}

pub async fn about(Extension(visitor): Extension<Visitor>) -> Response {
    views::render(&AboutPage {
        toasts: visitor.take_notifications(),
    })
}

pub async fn not_found(Extension(visitor): Extension<Visitor>) -> Response {
    views::render_status(
        StatusCode::NOT_FOUND,
        &NotFoundPage {
            toasts: visitor.take_notifications(),
        },
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct EducationQuery {
    lektion: Option<String>,
}

fn has_video(lesson: &Lesson) -> bool {
    lesson
        .video_url
        .as_deref()
        .is_some_and(|url| !url.trim().is_empty())
}

/// Lessons grouped under their module, in catalog order. Lessons whose module
/// is not in the catalog are left out.
fn group<'a>(modules: &'a [Module], lessons: &'a [Lesson]) -> Vec<(&'a Module, Vec<&'a Lesson>)> {
    modules
        .iter()
        .map(|module| {
            let mut own: Vec<&Lesson> = lessons
                .iter()
                .filter(|lesson| lesson.module_id == module.id)
                .collect();
            own.sort_by_key(|lesson| lesson.order_index);
            (module, own)
        })
        .collect()
}

fn build_page(
    modules: &[Module],
    lessons: &[Lesson],
    requested: Option<Uuid>,
    completed: &HashSet<Uuid>,
) -> EducationPage {
    let grouped = group(modules, lessons);
    let catalog: Vec<(&Module, &Lesson)> = grouped
        .iter()
        .flat_map(|(module, own)| own.iter().map(move |lesson| (*module, *lesson)))
        .collect();

    let active = requested
        .and_then(|id| catalog.iter().find(|(_, lesson)| lesson.id == id).copied())
        .or_else(|| catalog.first().copied());

    let total = catalog.len();
    let done = catalog
        .iter()
        .filter(|(_, lesson)| completed.contains(&lesson.id))
        .count();

    let active_id = active.map(|(_, lesson)| lesson.id);
    let active_module = active.map(|(module, _)| module.id);

    let module_views = grouped
        .iter()
        .enumerate()
        .map(|(index, (module, own))| ModuleView {
            title: module.title.clone(),
            expanded: active_module.map_or(index == 0, |id| id == module.id),
            lessons: own
                .iter()
                .map(|lesson| LessonLink {
                    id: lesson.id,
                    title: lesson.title.clone(),
                    active: Some(lesson.id) == active_id,
                    has_video: has_video(lesson),
                })
                .collect(),
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let progress = ProgressView::new(done as f64, total as f64);

    EducationPage {
        toasts: Vec::new(),
        modules: module_views,
        lesson: active.map(|(module, lesson)| LessonView {
            module_title: module.title.clone(),
            title: lesson.title.clone(),
            blocks: content::render(lesson.content_text.as_deref().unwrap_or_default()),
            has_video: has_video(lesson),
        }),
        progress,
    }
}

pub async fn education(
    State(state): State<AppState>,
    Extension(visitor): Extension<Visitor>,
    Query(query): Query<EducationQuery>,
) -> Response {
    let backend = state.backend();

    let modules = backend
        .list_modules(EXTERNAL_MARKET)
        .await
        .unwrap_or_else(|err| {
            error!("Error fetching modules: {err}");
            Vec::new()
        });
    let lessons = backend.list_lessons().await.unwrap_or_else(|err| {
        error!("Error fetching lessons: {err}");
        Vec::new()
    });

    let completed: HashSet<Uuid> = visitor.completed_lessons().await.into_iter().collect();
    let requested = query
        .lektion
        .as_deref()
        .and_then(|id| Uuid::parse_str(id.trim()).ok());

    let mut page = build_page(&modules, &lessons, requested, &completed);
    page.toasts = visitor.take_notifications();
    views::render(&page)
}
