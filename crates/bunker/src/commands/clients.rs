use anyhow::Result;
use nostr_bunker::AuthorizedClients;
use serde::Serialize;
use std::path::Path;

use super::open_storage;
use crate::output::Output;

#[derive(Serialize)]
struct ClientList {
    clients: Vec<String>,
    count: usize,
    capacity: usize,
}

/// Lists authorized clients, oldest first.
pub fn list(data_dir: &Path, output: &Output) -> Result<()> {
    let clients = AuthorizedClients::load(open_storage(data_dir)?)?;
    output.success(
        "clients list",
        ClientList {
            clients: clients.iter().map(str::to_string).collect(),
            count: clients.count(),
            capacity: clients.capacity(),
        },
    );
    Ok(())
}

pub fn clear(data_dir: &Path, output: &Output) -> Result<()> {
    let mut clients = AuthorizedClients::load(open_storage(data_dir)?)?;
    let removed = clients.count();
    clients.clear_all()?;
    output.success_message(
        "clients clear",
        &format!("Removed {} authorized clients", removed),
    );
    Ok(())
}
