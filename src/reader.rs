//! Directory reading
//!
//! Builds directory listings and single-resource descriptors out of
//! store primitives. A folder's files are its messages; its
//! subdirectories are the folders whose parent name is exactly the
//! folder's own name.

use crate::error::{Attempt, Error, StoreError, StoreResult};
use crate::info::Info;
use crate::path;
use crate::store::{FetchField, FolderEntry, FolderStatus, SelectedFolder, Store};
use tracing::debug;

/// SELECT `folder`, reporting a refusal as `path` not existing.
pub fn select_or_missing(
    store: &mut Store<'_>,
    path: &str,
    folder: &str,
) -> Attempt<SelectedFolder> {
    match store.select(folder) {
        Ok(selected) => Ok(selected),
        Err(StoreError::Protocol(message)) => {
            debug!("SELECT {:?} refused: {}", folder, message);
            Err(Error::not_found(path).into())
        }
        Err(err) => Err(err.into()),
    }
}

/// Full descriptors for everything inside the directory at `path`,
/// which the caller has already found to be a directory.
///
/// Messages come first, folders after; callers that need a stable
/// order sort for themselves.
pub fn read_dir(store: &mut Store<'_>, path: &str) -> Attempt<Vec<Info>> {
    let folder = store.store_path(path);
    let mut entries = Vec::new();

    let ids = message_ids(store, &folder)?;
    if !ids.is_empty() {
        let fetched = store.fetch(&ids, &FetchField::ALL)?;
        entries.extend(fetched.iter().map(|f| Info::message(f.id, Some(f))));
    }

    for child in child_folders(store, &folder)? {
        let status = status_or_none(store, &child.name)?;
        let (_, leaf) = child.split();
        entries.push(Info::directory(leaf, &child.flags, status.as_ref()));
    }
    Ok(entries)
}

/// Names inside the directory at `path`, without per-entry metadata.
pub fn list_names(store: &mut Store<'_>, path: &str) -> Attempt<Vec<String>> {
    let folder = store.store_path(path);
    let mut names: Vec<String> = message_ids(store, &folder)?
        .into_iter()
        .map(path::message_name)
        .collect();

    names.extend(
        child_folders(store, &folder)?
            .iter()
            .map(|child| child.split().1.to_string()),
    );
    Ok(names)
}

/// The descriptor of one resource below the root.
///
/// A `<id>.eml` name is looked up as a message in its parent folder;
/// any other name as a folder.
pub fn lookup(store: &mut Store<'_>, path: &str) -> Attempt<Info> {
    let (parent, name) = path::split(path);

    if let Some(id) = path::message_id(name) {
        let folder = store.store_path(parent);
        if folder.is_empty() {
            return Err(Error::not_found(path).into());
        }
        let selected = select_or_missing(store, path, &folder)?;
        if selected.exists == 0 {
            return Err(Error::not_found(path).into());
        }
        let fetched = store.fetch(&[id], &FetchField::ALL)?;
        return fetched
            .iter()
            .find(|f| f.id == id)
            .map(|f| Info::message(id, Some(f)))
            .ok_or_else(|| Error::not_found(path).into());
    }

    let folder = store.store_path(path);
    match store.find_folder(&folder)? {
        Some(entry) if !entry.has_no_inferiors() => {
            let status = status_or_none(store, &folder)?;
            Ok(Info::directory(name, &entry.flags, status.as_ref()))
        }
        _ => Err(Error::not_found(path).into()),
    }
}

/// Ids of every message in `folder`. The root and folders that refuse
/// SELECT (`\Noselect`) hold none.
fn message_ids(store: &mut Store<'_>, folder: &str) -> StoreResult<Vec<u32>> {
    if folder.is_empty() {
        return Ok(Vec::new());
    }
    match store.select(folder) {
        Ok(selected) if selected.exists > 0 => store.search_all(),
        Ok(_) => Ok(Vec::new()),
        Err(StoreError::Protocol(message)) => {
            debug!("SELECT {:?} refused, listing no messages: {}", folder, message);
            Ok(Vec::new())
        }
        Err(err) => Err(err),
    }
}

/// Folders directly below `folder`.
fn child_folders(store: &mut Store<'_>, folder: &str) -> StoreResult<Vec<FolderEntry>> {
    let mut listed = store.list_folders(folder)?;

    // A flat namespace root hides everything beneath it from a scoped
    // LIST; look again from the top.
    if let [only] = listed.as_slice()
        && only.delimiter.as_deref().is_none_or(str::is_empty)
        && only.has_no_inferiors()
    {
        listed = store.list_folders("")?;
    }

    listed.retain(|entry| !entry.has_no_inferiors() && entry.split().0 == folder);
    Ok(listed)
}

/// STATUS of a folder; `None` when the server refuses it (for
/// instance on `\Noselect` folders).
fn status_or_none(store: &mut Store<'_>, folder: &str) -> StoreResult<Option<FolderStatus>> {
    match store.status(folder) {
        Ok(status) => Ok(Some(status)),
        Err(StoreError::Protocol(message)) => {
            debug!("STATUS {:?} refused: {}", folder, message);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
