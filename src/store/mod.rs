//! The profile/widget store: reactive state with optimistic persistence
//!
//! All mutations land in local state first so the UI never waits on the
//! network; persistence follows asynchronously and reconciles ids (add),
//! rolls back (failed add), or just logs (edit/delete/reorder failures).

mod debounce;

pub use debounce::Debouncer;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use tracing::{debug, warn};

use crate::backend::{validate_image, Backend, UploadOptions, TOKEN_KEY_PREFIX};
use crate::config::ClientOptions;
use crate::error::Error;
use crate::icons::resolve_icon;
use crate::models::{
    NewWidget, NewWidgetRow, Profile, ProfilePatch, Viewer, Widget, WidgetId, WidgetPatch,
    WidgetRow,
};
use crate::ports::KeyValueStore;

/// In-memory store state; the single source of truth between suspension
/// points
#[derive(Default)]
struct StoreState {
    viewer: Option<Viewer>,
    profile: Option<Profile>,
    widgets: Vec<Widget>,
    loading: bool,
    /// Edits queued against still-transient widgets, replayed after the id
    /// swap
    pending_edits: HashMap<i64, WidgetPatch>,
}

/// Session-scoped store for the viewed profile and its widgets
pub struct ProfileStore {
    backend: Arc<Backend>,
    kv: Arc<dyn KeyValueStore>,
    options: ClientOptions,
    state: Arc<Mutex<StoreState>>,
    reorder_flush: Debouncer,
}

impl ProfileStore {
    /// Create a store bound to a backend and a local key-value store
    pub fn new(backend: Arc<Backend>, kv: Arc<dyn KeyValueStore>) -> Self {
        let options = backend.options().clone();
        let reorder_flush = Debouncer::new(options.reorder_debounce);
        Self {
            backend,
            kv,
            options,
            state: Arc::new(Mutex::new(StoreState::default())),
            reorder_flush,
        }
    }

    /// The authenticated viewer, if any
    pub fn viewer(&self) -> Option<Viewer> {
        self.state.lock().unwrap().viewer.clone()
    }

    /// The profile currently being viewed, if loaded
    pub fn profile(&self) -> Option<Profile> {
        self.state.lock().unwrap().profile.clone()
    }

    /// The current widget sequence, placeholder included
    pub fn widgets(&self) -> Vec<Widget> {
        self.state.lock().unwrap().widgets.clone()
    }

    /// Whether a profile load is in flight
    pub fn is_loading(&self) -> bool {
        self.state.lock().unwrap().loading
    }

    /// True iff the viewer is the owner of the viewed profile.
    ///
    /// A UI-level guard only; the authoritative check is the persistence
    /// layer's row-level authorization.
    pub fn is_owner(&self) -> bool {
        let state = self.state.lock().unwrap();
        match (&state.viewer, &state.profile) {
            (Some(viewer), Some(profile)) => viewer.id == profile.id,
            _ => false,
        }
    }

    /// Set (or clear) the viewer identity; a new identity triggers the
    /// idempotent ensure-profile step.
    pub async fn set_viewer(&self, viewer: Option<Viewer>) -> Result<Option<Profile>, Error> {
        {
            let mut state = self.state.lock().unwrap();
            state.viewer = viewer.clone();
        }
        match viewer {
            Some(_) => self.ensure_profile().await.map(Some),
            None => Ok(None),
        }
    }

    /// Look up the viewer's profile row, creating it on first sign-in and
    /// backfilling a missing avatar from the federated identity. Safe to run
    /// on every sign-in.
    pub async fn ensure_profile(&self) -> Result<Profile, Error> {
        let viewer = self
            .viewer()
            .ok_or_else(|| Error::auth("no authenticated viewer"))?;

        let existing = self
            .backend
            .rows("profiles")
            .select("*")
            .eq("id", &viewer.id)
            .fetch_optional::<Profile>()
            .await?;

        match existing {
            Some(mut profile) => {
                if profile.avatar_url.is_none() {
                    if let Some(avatar) = &viewer.avatar_url {
                        self.backend
                            .rows("profiles")
                            .update(serde_json::json!({ "avatar_url": avatar }))
                            .eq("id", &profile.id)
                            .send()
                            .await?;
                        profile.avatar_url = Some(avatar.clone());
                    }
                }
                Ok(profile)
            }
            None => {
                let profile = Profile {
                    id: viewer.id.clone(),
                    username: generate_handle(viewer.email.as_deref()),
                    full_name: None,
                    bio: Some("Just getting set up".to_string()),
                    location: None,
                    avatar_url: viewer.avatar_url.clone(),
                    handle_updated_at: None,
                };
                self.backend
                    .rows("profiles")
                    .insert(&profile)
                    .fetch_one::<Profile>()
                    .await
            }
        }
    }

    /// Load a profile by its public handle (exact, case-sensitive match).
    ///
    /// Returns `Ok(false)` when no profile carries the handle; the loading
    /// flag is cleared on every exit path.
    pub async fn load_profile(&self, handle: &str) -> Result<bool, Error> {
        {
            let mut state = self.state.lock().unwrap();
            state.loading = true;
            state.profile = None;
            state.widgets.clear();
        }

        let result = self.load_profile_inner(handle).await;

        self.state.lock().unwrap().loading = false;
        result
    }

    async fn load_profile_inner(&self, handle: &str) -> Result<bool, Error> {
        let profile = self
            .backend
            .rows("profiles")
            .select("*")
            .eq("username", handle)
            .fetch_optional::<Profile>()
            .await?;

        let profile = match profile {
            Some(profile) => profile,
            None => {
                debug!("no profile found for handle {:?}", handle);
                return Ok(false);
            }
        };

        let rows = self
            .backend
            .rows("widgets")
            .select("*")
            .eq("profile_id", &profile.id)
            .order("position", true)
            .fetch::<WidgetRow>()
            .await?;

        let mut widgets: Vec<Widget> = rows.into_iter().map(Widget::from).collect();
        for widget in &mut widgets {
            widget.icon = resolve_icon(widget);
        }
        widgets.push(Widget::placeholder());

        {
            let mut state = self.state.lock().unwrap();
            state.profile = Some(profile);
            state.widgets = widgets;
        }
        Ok(true)
    }

    /// Replace the widget ordering.
    ///
    /// The local sequence is swapped immediately so drag-and-drop feels
    /// instant. When the viewer owns the profile, a position flush is
    /// scheduled after the debounce quiet period; only the last ordering in
    /// the window is ever persisted.
    pub fn reorder(&self, new_order: Vec<Widget>) {
        {
            let mut state = self.state.lock().unwrap();
            state.widgets = new_order;
        }

        if !self.is_owner() {
            return;
        }

        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        self.reorder_flush.schedule(async move {
            flush_positions(backend, state).await;
        });
    }

    /// Add a widget, spliced in just before the trailing placeholder.
    ///
    /// The widget appears locally under a transient id; on persistence
    /// success the server-assigned id is swapped in place, on failure the
    /// entry is removed again.
    pub async fn add_widget(&self, new: NewWidget) -> Result<(), Error> {
        if !self.is_owner() {
            return Ok(());
        }

        let (temp, row) = {
            let mut state = self.state.lock().unwrap();
            let profile = match state.profile.as_ref() {
                Some(profile) => profile.clone(),
                None => return Ok(()),
            };

            let position = match state.widgets.iter().position(|w| w.is_placeholder()) {
                Some(_) => (state.widgets.len() - 1) as i32,
                None => state.widgets.len() as i32,
            };

            let temp = next_temp_id();
            let mut widget = Widget {
                id: WidgetId::Pending(temp),
                kind: new.kind,
                title: new.title.clone(),
                content: new.content.clone(),
                size: new.size.clone(),
                position,
                icon: None,
            };
            widget.icon = resolve_icon(&widget);

            let at = state
                .widgets
                .iter()
                .position(|w| w.is_placeholder())
                .unwrap_or(state.widgets.len());
            state.widgets.insert(at, widget);

            let row = NewWidgetRow {
                profile_id: profile.id,
                kind: new.kind,
                title: new.title,
                content: new.content,
                size: new.size,
                position,
            };
            (temp, row)
        };

        match self
            .backend
            .rows("widgets")
            .insert(&row)
            .fetch_one::<WidgetRow>()
            .await
        {
            Ok(created) => {
                // None: the widget was deleted locally while the insert was
                // in flight. Some(patch): an edit was queued against the
                // transient id.
                let followup = {
                    let mut state = self.state.lock().unwrap();
                    match state
                        .widgets
                        .iter_mut()
                        .find(|w| w.id == WidgetId::Pending(temp))
                    {
                        Some(widget) => {
                            widget.id = WidgetId::Persisted(created.id);
                            Some(state.pending_edits.remove(&temp))
                        }
                        None => None,
                    }
                };

                match followup {
                    Some(Some(patch)) if !patch.is_empty() => {
                        if let Err(e) = self
                            .backend
                            .rows("widgets")
                            .update(&patch)
                            .eq("id", created.id)
                            .send()
                            .await
                        {
                            warn!("failed to replay queued edit for widget {}: {}", created.id, e);
                        }
                    }
                    Some(_) => {}
                    None => {
                        if let Err(e) = self
                            .backend
                            .rows("widgets")
                            .delete()
                            .eq("id", created.id)
                            .send()
                            .await
                        {
                            warn!("failed to remove orphaned widget {}: {}", created.id, e);
                        }
                    }
                }
                Ok(())
            }
            Err(e) => {
                {
                    let mut state = self.state.lock().unwrap();
                    state.widgets.retain(|w| w.id != WidgetId::Pending(temp));
                    state.pending_edits.remove(&temp);
                }
                warn!("failed to add widget: {}", e);
                Err(e)
            }
        }
    }

    /// Merge a partial update into a widget and persist it.
    ///
    /// Edits against a still-transient widget apply locally and are queued
    /// until the add's round-trip completes.
    pub async fn edit_widget(&self, id: WidgetId, patch: WidgetPatch) -> Result<(), Error> {
        if !self.is_owner() {
            return Ok(());
        }

        enum Target {
            Missing,
            Queued,
            Persisted(i64),
        }

        let target = {
            let mut state = self.state.lock().unwrap();
            match state.widgets.iter_mut().find(|w| w.id == id) {
                None => Target::Missing,
                Some(widget) => {
                    patch.apply_to(widget);
                    widget.icon = None;
                    widget.icon = resolve_icon(widget);
                    match id {
                        WidgetId::Pending(temp) => {
                            state.pending_edits.entry(temp).or_default().merge(&patch);
                            Target::Queued
                        }
                        WidgetId::Persisted(real) => Target::Persisted(real),
                    }
                }
            }
        };

        match target {
            Target::Missing => {
                debug!("edit targeted unknown widget {}", id);
                Ok(())
            }
            Target::Queued => Ok(()),
            Target::Persisted(real) => self
                .backend
                .rows("widgets")
                .update(&patch)
                .eq("id", real)
                .send()
                .await
                .map_err(|e| {
                    warn!("failed to persist edit for widget {}: {}", real, e);
                    e
                }),
        }
    }

    /// Remove a widget locally, then from storage.
    ///
    /// Delete failures are logged, never reversed.
    pub async fn delete_widget(&self, id: WidgetId) -> Result<(), Error> {
        if !self.is_owner() {
            return Ok(());
        }

        {
            let mut state = self.state.lock().unwrap();
            state.widgets.retain(|w| w.id != id);
            if let WidgetId::Pending(temp) = id {
                state.pending_edits.remove(&temp);
            }
        }

        if let Some(real) = id.persisted() {
            self.backend
                .rows("widgets")
                .delete()
                .eq("id", real)
                .send()
                .await
                .map_err(|e| {
                    warn!("failed to delete widget {}: {}", real, e);
                    e
                })?;
        }
        Ok(())
    }

    /// Edit name/bio/location on the owned profile
    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<(), Error> {
        if !self.is_owner() {
            return Ok(());
        }

        let profile_id = {
            let mut state = self.state.lock().unwrap();
            let profile = match state.profile.as_mut() {
                Some(profile) => profile,
                None => return Ok(()),
            };
            if let Some(full_name) = &patch.full_name {
                profile.full_name = Some(full_name.clone());
            }
            if let Some(bio) = &patch.bio {
                profile.bio = Some(bio.clone());
            }
            if let Some(location) = &patch.location {
                profile.location = Some(location.clone());
            }
            profile.id.clone()
        };

        self.backend
            .rows("profiles")
            .update(&patch)
            .eq("id", &profile_id)
            .send()
            .await
            .map_err(|e| {
                warn!("failed to persist profile edit: {}", e);
                e
            })
    }

    /// Change the public handle.
    ///
    /// Limited to one change per cooldown window; inside the window the
    /// remaining time is reported without contacting storage. The
    /// availability pre-check is a UX hint only, the persistence layer's
    /// uniqueness constraint is authoritative.
    pub async fn update_handle(&self, new_handle: &str) -> Result<(), Error> {
        if !self.is_owner() {
            return Err(Error::auth("only the profile owner can change the handle"));
        }
        let profile = self
            .profile()
            .ok_or_else(|| Error::auth("no profile loaded"))?;

        if let Some(changed_at) = profile.handle_updated_at {
            let cooldown = ChronoDuration::hours(self.options.handle_cooldown_hours);
            let elapsed = Utc::now() - changed_at;
            if elapsed < cooldown {
                let remaining = cooldown - elapsed;
                let hours_remaining = (remaining.num_minutes() + 59) / 60;
                return Err(Error::RateLimited { hours_remaining });
            }
        }

        let taken = self
            .backend
            .rows("profiles")
            .select("id")
            .eq("username", new_handle)
            .fetch_optional::<serde_json::Value>()
            .await?;
        if let Some(row) = taken {
            if row["id"].as_str() != Some(profile.id.as_str()) {
                return Err(Error::validation(format!(
                    "The handle \"{}\" is already taken.",
                    new_handle
                )));
            }
        }

        let now = Utc::now();
        self.backend
            .rows("profiles")
            .update(serde_json::json!({
                "username": new_handle,
                "handle_updated_at": now,
            }))
            .eq("id", &profile.id)
            .send()
            .await?;

        {
            let mut state = self.state.lock().unwrap();
            if let Some(profile) = state.profile.as_mut() {
                profile.username = new_handle.to_string();
                profile.handle_updated_at = Some(now);
            }
        }
        Ok(())
    }

    /// Upload a new avatar, overwriting any previous one, and point the
    /// profile at its public URL
    pub async fn upload_avatar(&self, data: Vec<u8>, content_type: &str) -> Result<String, Error> {
        if !self.is_owner() {
            return Err(Error::auth("only the profile owner can change the avatar"));
        }
        let profile = self
            .profile()
            .ok_or_else(|| Error::auth("no profile loaded"))?;

        validate_image(&data, content_type, self.options.avatar_max_bytes)?;

        let path = format!("{}/avatar", profile.id);
        let storage = self.backend.storage();
        storage
            .upload(
                &self.options.avatar_bucket,
                &path,
                data,
                content_type,
                UploadOptions {
                    upsert: true,
                    cache_control: None,
                },
            )
            .await?;

        let url = storage.public_url(&self.options.avatar_bucket, &path);
        self.backend
            .rows("profiles")
            .update(serde_json::json!({ "avatar_url": url }))
            .eq("id", &profile.id)
            .send()
            .await?;

        {
            let mut state = self.state.lock().unwrap();
            if let Some(profile) = state.profile.as_mut() {
                profile.avatar_url = Some(url.clone());
            }
        }
        Ok(url)
    }

    /// Sign out: best-effort backend call, token purge, viewer cleared.
    ///
    /// The viewed profile stays loaded so the public page remains readable.
    pub async fn sign_out(&self) {
        if let Err(e) = self.backend.auth().sign_out().await {
            warn!("sign-out call failed: {}", e);
        }

        for key in self.kv.keys() {
            if key.starts_with(TOKEN_KEY_PREFIX) {
                self.kv.remove(&key);
            }
        }

        self.reorder_flush.cancel();
        let mut state = self.state.lock().unwrap();
        state.viewer = None;
        state.pending_edits.clear();
    }

    /// Drop all state, including the viewed profile
    pub fn reset(&self) {
        self.reorder_flush.cancel();
        *self.state.lock().unwrap() = StoreState::default();
    }
}

/// Persist the dense zero-based position of every persisted widget in the
/// current local order. Transient and placeholder entries are excluded; each
/// update is applied independently.
async fn flush_positions(backend: Arc<Backend>, state: Arc<Mutex<StoreState>>) {
    let updates: Vec<(i64, i32)> = {
        let state = state.lock().unwrap();
        state
            .widgets
            .iter()
            .filter(|w| !w.is_placeholder())
            .filter_map(|w| w.id.persisted())
            .enumerate()
            .map(|(index, id)| (id, index as i32))
            .collect()
    };

    for (id, position) in updates {
        if let Err(e) = backend
            .rows("widgets")
            .update(serde_json::json!({ "position": position }))
            .eq("id", id)
            .send()
            .await
        {
            warn!("failed to persist position for widget {}: {}", id, e);
        }
    }
}

static LAST_TEMP_ID: AtomicI64 = AtomicI64::new(0);

/// Current-time-based transient id, strictly monotonic within the process so
/// rapid adds never collide
fn next_temp_id() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_TEMP_ID.load(Ordering::SeqCst);
    loop {
        let candidate = now.max(last + 1);
        match LAST_TEMP_ID.compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

/// Unique-enough handle from the email local-part plus a numeric suffix
fn generate_handle(email: Option<&str>) -> String {
    let local = email.and_then(|e| e.split('@').next()).unwrap_or("user");
    let base: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    let base = if base.is_empty() { "user".to_string() } else { base };
    let suffix: u32 = rand::thread_rng().gen_range(1000..10000);
    format!("{}{}", base, suffix)
}
