//! The persisted-file entity.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use common::ContentHash;
use common::storage::filesystem::write_atomic;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::client::Client;
use crate::error::{Result, SdkError};
use crate::filename::validate_file_name;
use crate::ids::FileId;
use crate::ownership::{OwnershipLevel, Scope};
use crate::store::{FileStore, UploadReceipt, UploadRequest};
use crate::ticket::Ticket;
use crate::user::User;

/// How [`PersistedFile::write_to_location`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Write a temp file next to the target and rename it into place.
    pub atomic: bool,
    /// Create missing parent directories.
    pub create_dirs: bool,
    /// Replace an existing file. When false an existing target is an error.
    pub overwrite: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            atomic: true,
            create_dirs: true,
            overwrite: true,
        }
    }
}

impl WriteOptions {
    pub fn atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    pub fn create_dirs(mut self, create_dirs: bool) -> Self {
        self.create_dirs = create_dirs;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

struct FileState {
    name: String,
    mime_type: Option<String>,
    owner: Option<User>,
    ownership: OwnershipLevel,
    store: Option<Arc<dyn FileStore>>,
    last_receipt: Option<UploadReceipt>,
}

impl FileState {
    /// Scope a resolved file is persisted under.
    fn resolved_scope(&self) -> Option<Scope> {
        match self.ownership {
            OwnershipLevel::Unknown => None,
            OwnershipLevel::AppLevel => Some(Scope::App),
            OwnershipLevel::UserLevel => self.owner.as_ref().map(|u| Scope::User(u.id().clone())),
        }
    }

    /// Reject a save at `requested` that would move the file to another scope.
    fn check_scope(&self, requested: &Scope) -> Result<()> {
        let allowed = match (self.ownership, requested) {
            (OwnershipLevel::Unknown, Scope::App) => self.owner.is_none(),
            (OwnershipLevel::Unknown, Scope::User(_)) => true,
            (OwnershipLevel::AppLevel, Scope::App) => true,
            (OwnershipLevel::UserLevel, Scope::User(id)) => {
                self.owner.as_ref().is_some_and(|owner| owner.id() == id)
            }
            _ => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(SdkError::ScopeConflict {
                current: self.ownership.resolve(self.owner.is_some()),
                requested: requested.clone(),
            })
        }
    }

    fn effective_mime_type(&self) -> String {
        self.mime_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.name)
                .first_or_octet_stream()
                .to_string()
        })
    }
}

struct FileInner {
    id: FileId,
    content: Arc<[u8]>,
    state: Mutex<FileState>,
    /// Serializes store operations of this file.
    lane: tokio::sync::Mutex<()>,
}

impl FileInner {
    fn lock_state(&self) -> MutexGuard<'_, FileState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach to `store` and resolve the ownership level if still unknown.
    fn attach_locked(&self, state: &mut FileState, store: Arc<dyn FileStore>) -> Result<()> {
        if let Some(current) = &state.store
            && current.id() != store.id()
            && !Arc::ptr_eq(current.membership(), store.membership())
        {
            return Err(SdkError::ForeignStore {
                from: current.id(),
                to: store.id(),
            });
        }

        store.attach(self.id);
        state.ownership = state.ownership.resolve(state.owner.is_some());
        state.store = Some(store);
        Ok(())
    }

    async fn run_upload(
        &self,
        store: Arc<dyn FileStore>,
        request: UploadRequest,
    ) -> Result<UploadReceipt> {
        let _lane = self.lane.lock().await;
        let receipt = store.upload(request).await?;
        self.lock_state().last_receipt = Some(receipt.clone());
        Ok(receipt)
    }

    async fn run_remove(&self, store: Arc<dyn FileStore>, scope: Scope, name: String) -> Result<bool> {
        let _lane = self.lane.lock().await;
        let removed = store.remove(&scope, &name).await?;
        if removed {
            self.lock_state().last_receipt = None;
        }
        Ok(removed)
    }
}

impl Drop for FileInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = state.store.take() {
            store.detach(self.id);
        }
    }
}

/// Binary content with a name, an optional owner and a store it persists to.
///
/// Cloning yields another handle to the same entity. The content is immutable
/// and can be read from any thread without locking. When the last handle is
/// dropped the file leaves its store's membership.
#[derive(Clone)]
pub struct PersistedFile {
    inner: Arc<FileInner>,
}

impl PersistedFile {
    /// App or user scope is decided when the file is first attached to a store.
    pub fn new(content: impl Into<Arc<[u8]>>, name: &str) -> Result<Self> {
        Self::build(content.into(), name, None, None)
    }

    /// A file bound to `owner`. It resolves to user level once attached.
    pub fn with_owner(
        content: impl Into<Arc<[u8]>>,
        name: &str,
        owner: User,
        mime_type: Option<String>,
    ) -> Result<Self> {
        Self::build(content.into(), name, Some(owner), mime_type)
    }

    fn build(
        content: Arc<[u8]>,
        name: &str,
        owner: Option<User>,
        mime_type: Option<String>,
    ) -> Result<Self> {
        let name = validate_file_name(name)?.to_string();
        Ok(Self {
            inner: Arc::new(FileInner {
                id: FileId::new(),
                content,
                state: Mutex::new(FileState {
                    name,
                    mime_type,
                    owner,
                    ownership: OwnershipLevel::Unknown,
                    store: None,
                    last_receipt: None,
                }),
                lane: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// A file that already exists in `store` under `scope`.
    pub(crate) fn restored(
        content: Vec<u8>,
        name: &str,
        mime_type: String,
        scope: &Scope,
        store: Arc<dyn FileStore>,
    ) -> Result<Self> {
        let owner = scope.user().cloned().map(User::from);
        let file = Self::build(content.into(), name, owner, Some(mime_type))?;
        file.set_store(store)?;
        Ok(file)
    }

    pub fn id(&self) -> FileId {
        self.inner.id
    }

    pub fn content(&self) -> &[u8] {
        &self.inner.content
    }

    pub fn size(&self) -> u64 {
        self.inner.content.len() as u64
    }

    pub fn content_hash(&self) -> ContentHash {
        ContentHash::compute(&self.inner.content)
    }

    pub fn name(&self) -> String {
        self.inner.lock_state().name.clone()
    }

    /// Rename. The next save stores the content under the new name; the object
    /// under the old name is left in place.
    pub fn set_name(&self, name: &str) -> Result<()> {
        let name = validate_file_name(name)?.to_string();
        self.inner.lock_state().name = name;
        Ok(())
    }

    pub fn mime_type(&self) -> Option<String> {
        self.inner.lock_state().mime_type.clone()
    }

    pub fn set_mime_type(&self, mime_type: Option<String>) {
        self.inner.lock_state().mime_type = mime_type;
    }

    /// The explicit MIME type, or one guessed from the name's extension.
    pub fn effective_mime_type(&self) -> String {
        self.inner.lock_state().effective_mime_type()
    }

    pub fn owner(&self) -> Option<User> {
        self.inner.lock_state().owner.clone()
    }

    /// Change the owner while the level is unknown.
    ///
    /// Once resolved, only changes that keep the scope are accepted: no owner for
    /// an app-level file, the same user for a user-level one.
    pub fn set_owner(&self, owner: Option<User>) -> Result<()> {
        let mut state = self.inner.lock_state();
        let keeps_scope = match (state.ownership, &owner) {
            (OwnershipLevel::Unknown, _) => true,
            (OwnershipLevel::AppLevel, None) => true,
            (OwnershipLevel::UserLevel, Some(new)) => state.owner.as_ref() == Some(new),
            _ => false,
        };
        if !keeps_scope {
            return Err(SdkError::ScopeConflict {
                current: state.ownership,
                requested: Scope::from(owner.map(|u| u.id().clone())),
            });
        }
        state.owner = owner;
        Ok(())
    }

    pub fn ownership_level(&self) -> OwnershipLevel {
        self.inner.lock_state().ownership
    }

    pub fn is_user_level(&self) -> bool {
        self.ownership_level() == OwnershipLevel::UserLevel
    }

    pub fn store(&self) -> Option<Arc<dyn FileStore>> {
        self.inner.lock_state().store.clone()
    }

    /// Move the file to `store`.
    ///
    /// Leaving the old store and joining the new one is a single change of the
    /// shared membership registry. Both stores must share that registry.
    pub fn set_store(&self, store: Arc<dyn FileStore>) -> Result<()> {
        let mut state = self.inner.lock_state();
        self.inner.attach_locked(&mut state, store)
    }

    /// Leave the current store. Returns whether the file had one.
    pub fn clear_store(&self) -> bool {
        let mut state = self.inner.lock_state();
        match state.store.take() {
            Some(store) => {
                store.detach(self.inner.id);
                true
            }
            None => false,
        }
    }

    pub fn last_receipt(&self) -> Option<UploadReceipt> {
        self.inner.lock_state().last_receipt.clone()
    }

    /// Where [`write_to_cache`](Self::write_to_cache) puts the content.
    pub fn cache_location(&self, client: &Client) -> PathBuf {
        client.cache_root().join(self.name())
    }

    /// Write an exact copy of the content to `path`.
    pub async fn write_to_location(&self, path: impl AsRef<Path>, options: WriteOptions) -> Result<()> {
        let path = path.as_ref();

        if options.create_dirs
            && let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        match (options.atomic, options.overwrite) {
            (true, true) => write_atomic(path, &self.inner.content).await?,
            (true, false) => {
                if fs::try_exists(path).await? {
                    return Err(already_exists(path).into());
                }
                write_atomic(path, &self.inner.content).await?;
            }
            (false, true) => fs::write(path, &self.inner.content).await?,
            (false, false) => {
                let mut file = fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(path)
                    .await?;
                file.write_all(&self.inner.content).await?;
                file.flush().await?;
            }
        }

        debug!(file_id = %self.inner.id, path = %path.display(), size = self.size(), "File written");
        Ok(())
    }

    /// Mirror the content into the client's cache directory.
    pub async fn write_to_cache(&self, client: &Client) -> Result<PathBuf> {
        let path = self.cache_location(client);
        self.write_to_location(&path, WriteOptions::default()).await?;
        Ok(path)
    }

    /// Upload at app scope through the file's store, or the client's default
    /// store when it has none.
    ///
    /// Fails with [`SdkError::ScopeConflict`] if the file is bound to a user.
    pub fn save(&self, client: &Client) -> Ticket<UploadReceipt> {
        self.submit_upload(client, Scope::App, None)
    }

    /// Upload at `user`'s scope, making `user` the owner.
    ///
    /// Fails with [`SdkError::ScopeConflict`] if the file is app-level or bound
    /// to another user.
    pub fn save_with_user(&self, client: &Client, user: &User) -> Ticket<UploadReceipt> {
        self.submit_upload(client, Scope::User(user.id().clone()), Some(user.clone()))
    }

    fn submit_upload(&self, client: &Client, scope: Scope, user: Option<User>) -> Ticket<UploadReceipt> {
        let runtime = client.runtime().clone();
        let prepared = {
            let mut state = self.inner.lock_state();
            self.prepare_upload(&mut state, client, scope, user)
        };
        let (store, request) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                debug!(file_id = %self.inner.id, error = %e, "Save rejected");
                return Ticket::ready(runtime, Err(e));
            }
        };

        let (completer, ticket) = Ticket::channel(runtime.clone());
        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            completer.complete(inner.run_upload(store, request).await);
        });
        ticket
    }

    fn prepare_upload(
        &self,
        state: &mut FileState,
        client: &Client,
        scope: Scope,
        user: Option<User>,
    ) -> Result<(Arc<dyn FileStore>, UploadRequest)> {
        state.check_scope(&scope)?;
        if let Some(user) = user {
            state.owner = Some(user);
        }

        let store = state.store.clone().unwrap_or_else(|| client.default_store());
        self.inner.attach_locked(state, Arc::clone(&store))?;

        let request = UploadRequest {
            file_id: self.inner.id,
            name: state.name.clone(),
            mime_type: state.effective_mime_type(),
            scope,
            content: Arc::clone(&self.inner.content),
        };
        Ok((store, request))
    }

    /// Delete the stored copy from the file's store (or the default store).
    ///
    /// Resolves to `false` when the file was never attached or nothing was
    /// stored under its name.
    pub fn remove(&self, client: &Client) -> Ticket<bool> {
        let runtime = client.runtime().clone();
        let target = {
            let state = self.inner.lock_state();
            state.resolved_scope().map(|scope| {
                let store = state.store.clone().unwrap_or_else(|| client.default_store());
                (store, scope, state.name.clone())
            })
        };
        let Some((store, scope, name)) = target else {
            return Ticket::ready(runtime, Ok(false));
        };

        let (completer, ticket) = Ticket::channel(runtime.clone());
        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            completer.complete(inner.run_remove(store, scope, name).await);
        });
        ticket
    }
}

impl std::fmt::Debug for PersistedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("PersistedFile")
            .field("id", &self.inner.id)
            .field("name", &state.name)
            .field("size", &self.inner.content.len())
            .field("ownership", &state.ownership)
            .field("store", &state.store.as_ref().map(|s| s.id()))
            .finish()
    }
}

fn already_exists(path: &Path) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("{} already exists", path.display()),
    )
}
