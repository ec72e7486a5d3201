//! Query façade consumed by presentation.
//!
//! One-shot reads return the committed state. The `watch_*` forms return
//! streams that emit the current value, then re-emit whenever a committed
//! write to the relevant kind changes the result.

use crate::db::LibraryDatabase;
use crate::error::{LibraryError, Result};
use crate::models::{
    AudioLocaleVariant, ContentItem, ContentKind, Locale, LocalizedContent, TextSource,
    TranslationField, TranslationRecord,
};
use crate::repositories::{
    ContentRepository, SqliteAudioLocaleRepository, SqliteContentRepository,
    SqliteTranslationRepository,
};
use futures::future::{BoxFuture, FutureExt};
use sqlx::SqliteConnection;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Read-side service over the content cache
#[derive(Clone)]
pub struct ContentQueryService {
    db: LibraryDatabase,
    content: Arc<dyn ContentRepository>,
}

impl ContentQueryService {
    pub fn new(db: LibraryDatabase) -> Self {
        Self {
            content: Arc::new(SqliteContentRepository::new(db.pool().clone())),
            db,
        }
    }

    /// Every cached item of a kind, in `local_id` order
    #[instrument(skip(self))]
    pub async fn all_items(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
        self.content.list_by_kind(kind).await
    }

    /// Favourite items of a kind, most recently favourited first
    #[instrument(skip(self))]
    pub async fn favourite_items(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
        self.content.list_favourites(kind).await
    }

    /// Resolve an item's texts and audio asset for a locale code.
    ///
    /// Unknown codes resolve against the base locale.
    #[instrument(skip(self))]
    pub async fn item_with_translation(
        &self,
        document_id: &str,
        locale_code: &str,
    ) -> Result<LocalizedContent> {
        let locale = match Locale::parse(locale_code) {
            Some(locale) => locale,
            None => {
                debug!(locale_code, "Unsupported locale, using base locale");
                Locale::BASE
            }
        };

        // One read transaction so every row comes from the same snapshot.
        let mut tx = self.db.pool().begin().await?;
        let localized = Self::localized_in(&mut tx, document_id, locale).await?;
        tx.commit().await?;

        Ok(localized)
    }

    async fn localized_in(
        conn: &mut SqliteConnection,
        document_id: &str,
        locale: Locale,
    ) -> Result<LocalizedContent> {
        let item = SqliteContentRepository::find_in(conn, document_id)
            .await?
            .ok_or_else(|| LibraryError::content_not_found(document_id))?;

        let name =
            SqliteTranslationRepository::find_in(conn, document_id, TranslationField::Name)
                .await?;
        let description =
            SqliteTranslationRepository::find_in(conn, document_id, TranslationField::Description)
                .await?;
        let audio = if item.kind.supports_audio_locales() {
            SqliteAudioLocaleRepository::find_in(conn, document_id).await?
        } else {
            None
        };

        Ok(localize(
            item,
            locale,
            name.as_ref(),
            description.as_ref(),
            audio.as_ref(),
        ))
    }

    // =========================================================================
    // Observable queries
    // =========================================================================

    pub fn watch_all_items(&self, kind: ContentKind) -> BoxStream<'static, Result<Vec<ContentItem>>> {
        self.watch(kind, move |service| {
            async move { service.all_items(kind).await }.boxed()
        })
    }

    pub fn watch_favourite_items(
        &self,
        kind: ContentKind,
    ) -> BoxStream<'static, Result<Vec<ContentItem>>> {
        self.watch(kind, move |service| {
            async move { service.favourite_items(kind).await }.boxed()
        })
    }

    /// Watch one item's localized view.
    ///
    /// The kind is needed up front so the stream subscribes before its first
    /// read.
    pub fn watch_item_with_translation(
        &self,
        document_id: &str,
        kind: ContentKind,
        locale_code: &str,
    ) -> BoxStream<'static, Result<LocalizedContent>> {
        let document_id = document_id.to_string();
        let locale_code = locale_code.to_string();
        self.watch(kind, move |service| {
            let document_id = document_id.clone();
            let locale_code = locale_code.clone();
            async move {
                service
                    .item_with_translation(&document_id, &locale_code)
                    .await
            }
            .boxed()
        })
    }

    fn watch<T, F>(&self, kind: ContentKind, load: F) -> BoxStream<'static, Result<T>>
    where
        T: PartialEq + Clone + Send + 'static,
        F: Fn(ContentQueryService) -> BoxFuture<'static, Result<T>> + Send + 'static,
    {
        let state = WatchState {
            service: self.clone(),
            receiver: self.db.changes().subscribe(),
            closed: self.db.changes().closed_token(),
            kind,
            load,
            last: None,
            started: false,
        };

        stream::unfold(state, |mut state| async move {
            if !state.started {
                state.started = true;
                let value = (state.load)(state.service.clone()).await;
                if let Ok(value) = &value {
                    state.last = Some(value.clone());
                }
                return Some((value, state));
            }

            loop {
                let received = tokio::select! {
                    biased;
                    _ = state.closed.cancelled() => return None,
                    received = state.receiver.recv() => received,
                };

                match received {
                    Ok(change) if change.kind != state.kind => continue,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, kind = %state.kind, "Watcher lagged, re-querying");
                    }
                    Err(RecvError::Closed) => return None,
                }

                match (state.load)(state.service.clone()).await {
                    Ok(value) if state.last.as_ref() == Some(&value) => continue,
                    Ok(value) => {
                        state.last = Some(value.clone());
                        return Some((Ok(value), state));
                    }
                    Err(error) => {
                        if state.closed.is_cancelled() {
                            return None;
                        }
                        warn!(error = %error, kind = %state.kind, "Watched query failed");
                        return Some((Err(error), state));
                    }
                }
            }
        })
        .boxed()
    }
}

struct WatchState<T, F> {
    service: ContentQueryService,
    receiver: broadcast::Receiver<crate::changes::ContentChange>,
    closed: CancellationToken,
    kind: ContentKind,
    load: F,
    last: Option<T>,
    started: bool,
}

/// Apply the fallback chain: requested locale, base locale, then the item's own values.
pub(crate) fn localize(
    item: ContentItem,
    locale: Locale,
    name: Option<&TranslationRecord>,
    description: Option<&TranslationRecord>,
    audio: Option<&AudioLocaleVariant>,
) -> LocalizedContent {
    let (display_name, name_source) =
        match resolve(locale, |l| name.and_then(|record| record.text(l))) {
            Some((text, source)) => (text.to_string(), source),
            None => (item.display_name_fallback.clone(), TextSource::Fallback),
        };

    let description = resolve(locale, |l| description.and_then(|record| record.text(l)))
        .map(|(text, _)| text.to_string());

    let audio_asset_path = resolve(locale, |l| audio.and_then(|variant| variant.asset(l)))
        .map(|(asset, _)| asset.to_string())
        .unwrap_or_else(|| item.asset_path.clone());

    LocalizedContent {
        item,
        locale,
        display_name,
        name_source,
        description,
        audio_asset_path,
    }
}

fn resolve<'a>(
    locale: Locale,
    lookup: impl Fn(Locale) -> Option<&'a str>,
) -> Option<(&'a str, TextSource)> {
    let non_blank = |l: Locale| lookup(l).filter(|text| !text.trim().is_empty());

    non_blank(locale)
        .map(|text| (text, TextSource::Requested))
        .or_else(|| non_blank(Locale::BASE).map(|text| (text, TextSource::Base)))
}
