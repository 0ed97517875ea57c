use serde::Deserialize;

use crate::api::state::AppState;
use crate::db::models::{Chirp, ChirpPatch, NewChirp, Subject};
use crate::error::AppError;

const MASKED_WORDS: [&str; 3] = ["kerfuffle", "sharbert", "fornax"];
const MASK: &str = "****";

#[derive(Debug, Deserialize)]
pub struct ChirpRequest {
    pub body: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl std::str::FromStr for SortOrder {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(AppError::Validation(format!("Unknown sort order: {}", other))),
        }
    }
}

/// Check the body length and mask blocked words
pub(crate) fn validate_body(body: &str, max_length: usize) -> Result<String, AppError> {
    if body.trim().is_empty() {
        return Err(AppError::Validation("Chirp must not be empty".to_string()));
    }
    if body.chars().count() > max_length {
        return Err(AppError::Validation(format!(
            "Chirp is too long (max {} characters)",
            max_length
        )));
    }

    let cleaned: Vec<&str> = body
        .split(' ')
        .map(|word| {
            if MASKED_WORDS.contains(&word.to_lowercase().as_str()) {
                MASK
            } else {
                word
            }
        })
        .collect();
    Ok(cleaned.join(" "))
}

pub async fn post_chirp(
    state: &AppState,
    subject: Subject,
    req: ChirpRequest,
) -> Result<Chirp, AppError> {
    let body = validate_body(&req.body, state.config.max_chirp_length)?;

    let chirp = state
        .store
        .chirps()
        .create(NewChirp {
            author_id: subject.0,
            body,
        })
        .await?;

    tracing::debug!(chirp_id = chirp.id, author_id = chirp.author_id, "chirp posted");
    Ok(chirp)
}

/// Lists chirps by id, optionally only those of one author.
pub async fn list_chirps(
    state: &AppState,
    author_id: Option<u64>,
    order: SortOrder,
) -> Result<Vec<Chirp>, AppError> {
    let chirps = state.store.chirps();
    let mut listed = match author_id {
        Some(author_id) => chirps.get_where(|chirp| chirp.author_id == author_id).await?,
        None => chirps.get_all().await?,
    };

    if order == SortOrder::Desc {
        listed.reverse();
    }
    Ok(listed)
}

pub async fn get_chirp(state: &AppState, id: u64) -> Result<Chirp, AppError> {
    state.store.chirps().get_by_id(&id).await
}

pub async fn edit_chirp(
    state: &AppState,
    subject: Subject,
    id: u64,
    req: ChirpRequest,
) -> Result<Chirp, AppError> {
    let body = validate_body(&req.body, state.config.max_chirp_length)?;

    state
        .store
        .chirps()
        .update_as(&id, subject, ChirpPatch { body: Some(body) })
        .await
}

pub async fn delete_chirp(state: &AppState, subject: Subject, id: u64) -> Result<(), AppError> {
    state.store.chirps().delete_by_id(&id, subject).await?;
    tracing::debug!(chirp_id = id, %subject, "chirp deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;
    use crate::api::users::{register, RegisterRequest};
    use crate::error::ErrorKind;

    async fn with_users(count: usize) -> (tempfile::TempDir, AppState) {
        let (dir, state) = test_state().await;
        for i in 0..count {
            register(
                &state,
                RegisterRequest {
                    email: format!("user{}@example.com", i),
                    password: "123456".to_string(),
                },
            )
            .await
            .unwrap();
        }
        (dir, state)
    }

    fn chirp(body: &str) -> ChirpRequest {
        ChirpRequest {
            body: body.to_string(),
        }
    }

    #[test]
    fn test_validate_body() {
        assert_eq!(
            validate_body("This is a kerfuffle opinion I need to share", 140).unwrap(),
            "This is a **** opinion I need to share"
        );
        assert_eq!(validate_body("Sharbert! stays", 140).unwrap(), "Sharbert! stays");
        assert_eq!(validate_body("FORNAX", 140).unwrap(), MASK);

        assert!(validate_body("   ", 140).is_err());
        assert!(validate_body(&"x".repeat(141), 140).is_err());
        assert!(validate_body(&"é".repeat(140), 140).is_ok());
    }

    #[test]
    fn test_sort_order_parse() {
        assert_eq!("".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert_eq!("desc".parse::<SortOrder>().unwrap(), SortOrder::Desc);
        assert!("sideways".parse::<SortOrder>().is_err());
    }

    #[tokio::test]
    async fn test_post_requires_existing_author() {
        let (_dir, state) = with_users(1).await;

        let posted = post_chirp(&state, Subject(1), chirp("hello")).await.unwrap();
        assert_eq!(posted.id, 1);
        assert_eq!(posted.author_id, 1);

        let err = post_chirp(&state, Subject(9), chirp("ghost")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let (_dir, state) = with_users(2).await;
        post_chirp(&state, Subject(1), chirp("one")).await.unwrap();
        post_chirp(&state, Subject(2), chirp("two")).await.unwrap();
        post_chirp(&state, Subject(1), chirp("three")).await.unwrap();

        let ids = |chirps: Vec<Chirp>| chirps.into_iter().map(|c| c.id).collect::<Vec<_>>();

        assert_eq!(ids(list_chirps(&state, None, SortOrder::Asc).await.unwrap()), vec![1, 2, 3]);
        assert_eq!(ids(list_chirps(&state, None, SortOrder::Desc).await.unwrap()), vec![3, 2, 1]);
        assert_eq!(ids(list_chirps(&state, Some(1), SortOrder::Asc).await.unwrap()), vec![1, 3]);
        assert!(list_chirps(&state, Some(7), SortOrder::Asc).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_and_delete_are_owner_only() {
        let (_dir, state) = with_users(2).await;
        let posted = post_chirp(&state, Subject(1), chirp("draft")).await.unwrap();

        let err = edit_chirp(&state, Subject(2), posted.id, chirp("hijack")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(get_chirp(&state, posted.id).await.unwrap().body, "draft");
        let err = edit_chirp(&state, Subject(1), 99, chirp("nothing here")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = delete_chirp(&state, Subject(2), posted.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let edited = edit_chirp(&state, Subject(1), posted.id, chirp("final")).await.unwrap();
        assert_eq!(edited.body, "final");

        delete_chirp(&state, Subject(1), posted.id).await.unwrap();
        let err = get_chirp(&state, posted.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
