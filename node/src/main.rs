use std::io;
use std::sync::{mpsc, Arc};

use anyhow::Context;
use sidewinder_messaging::{Contact, ContactBook, SessionError};
use sidewinder_node::contact_store::{ContactStore, StoreError};
use sidewinder_node::keystore::{self, Keystore};
use sidewinder_node::listener::{InboundEvent, Listener};
use sidewinder_node::outbound::{self, SendError};
use sidewinder_node::state::AppState;
use sidewinder_node::ui::{self, Command};
use sidewinder_node::{init_tracing, AppConfig};

fn main() -> anyhow::Result<()> {
    init_tracing();
    ui::banner();

    let config = AppConfig::from_env()?;
    let keystore = Keystore::new(config.key_dir());
    let keys = keystore::login(&keystore).context("could not open the keystore")?;

    let store = ContactStore::new(config.contact_dir());
    let (book, store_tainted) = match store.load(keys.private()) {
        Ok(book) => (book, false),
        Err(StoreError::StoreCorrupt) => {
            ui::print_red("Your contact store is present but unreadable. Starting with an empty book.");
            ui::print_yellow("The store on disk will not be overwritten unless you confirm.");
            (ContactBook::new(), true)
        }
        Err(err) => return Err(err).context("could not open the contact store"),
    };

    let fingerprint = keys
        .fingerprint()
        .context("could not fingerprint the account key")?;
    println!("Your fingerprint: {fingerprint}\n");

    let (events_tx, events_rx) = mpsc::channel();
    let state = AppState::new(config, keys, store, book, store_tainted);
    let listener =
        Listener::start(Arc::clone(&state), events_tx).context("could not bind the listener")?;
    println!("Listening for peers on port {}.", listener.port());
    ui::print_help();
    println!();

    loop {
        drain_events(&events_rx);
        match ui::prompt_command()? {
            Command::Send => cmd_send(&state)?,
            Command::List => cmd_list(&state),
            Command::View(name) => cmd_view(&state, name)?,
            Command::Add => cmd_add(&state)?,
            Command::Help => ui::print_help(),
            Command::Quit => break,
        }
    }

    if state.store_tainted() {
        let overwrite = ui::confirm(
            "The unreadable contact store was preserved. Overwrite it with the current book? [y/N] ",
        )?;
        if overwrite {
            match state.force_save_book() {
                Ok(()) => ui::print_green("Contact store rewritten."),
                Err(err) => ui::print_red(&format!("Rewriting the store failed: {err}")),
            }
        }
    }

    listener.stop();
    Ok(())
}

/// Surface inbound activity collected while the user was at a prompt.
fn drain_events(events: &mpsc::Receiver<InboundEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            InboundEvent::MessageReceived {
                contact_name,
                persisted,
            } => {
                ui::print_yellow(&format!(
                    "New message from {contact_name}. Use 'view {contact_name}' to read it."
                ));
                if !persisted {
                    warn_unsaved();
                }
            }
            InboundEvent::UnknownPeer { ip, fingerprint } => {
                ui::print_yellow(&format!(
                    "A peer at {ip} sent a message but is not a trusted contact."
                ));
                ui::print_yellow(&format!("Their key fingerprint: {fingerprint}"));
                ui::print_yellow("Verify it out-of-band, then use 'add' to accept the message.");
            }
            InboundEvent::Unauthenticated { ip } => {
                ui::print_red(&format!(
                    "A peer at {ip} failed authentication; their message was discarded."
                ));
            }
        }
    }
}

fn warn_unsaved() {
    ui::print_yellow(
        "Warning: the change is held in memory only; the on-disk store was not overwritten.",
    );
}

fn cmd_send(state: &Arc<AppState>) -> io::Result<()> {
    let (id, ip, expected) = loop {
        let name = ui::prompt("To: ")?;
        if name.is_empty() {
            return Ok(());
        }
        let found = {
            let book = state.lock_book();
            book.find_by_name(&name)
                .map(|c| (c.id, c.ip.clone(), c.fingerprint.clone()))
        };
        match found {
            Some((id, ip, Some(fingerprint))) => break (id, ip, fingerprint),
            Some((_, _, None)) => {
                ui::print_red(
                    "That contact has no recorded fingerprint; record one with 'add' first.",
                );
                return Ok(());
            }
            None => ui::print_red("Contact not recognized."),
        }
    };

    let text = ui::prompt("Message: ")?;
    if text.is_empty() {
        return Ok(());
    }

    match outbound::send_to_contact(state, id, &ip, &expected, &text) {
        Ok(delivery) => {
            ui::print_green("Message sent.");
            if !delivery.persisted {
                warn_unsaved();
            }
        }
        Err(SendError::PeerUnreachable) => {
            ui::print_red("Peer unreachable; nothing was sent.");
        }
        Err(SendError::Session(SessionError::PeerUnauthenticated)) => {
            ui::print_red("The peer failed authentication; nothing was sent.");
        }
        Err(SendError::Session(SessionError::Transport(_))) => {
            ui::print_red("Connection lost mid-session; nothing was persisted.");
        }
        Err(err) => ui::print_red(&format!("Send failed: {err}")),
    }
    Ok(())
}

fn cmd_list(state: &Arc<AppState>) {
    let book = state.lock_book();
    ui::render_contact_list(&book);
}

fn cmd_view(state: &Arc<AppState>, name: Option<String>) -> io::Result<()> {
    let name = match name {
        Some(name) => name,
        None => {
            let name = ui::prompt("Contact: ")?;
            if name.is_empty() {
                return Ok(());
            }
            name
        }
    };
    let book = state.lock_book();
    match book.find_by_name(&name) {
        Some(contact) => ui::render_conversation(contact),
        None => ui::print_red("Contact not recognized."),
    }
    Ok(())
}

fn cmd_add(state: &Arc<AppState>) -> io::Result<()> {
    let name = ui::prompt("Name: ")?;
    if name.is_empty() {
        ui::print_red("A contact needs a name.");
        return Ok(());
    }

    let existing = {
        let book = state.lock_book();
        book.find_by_name(&name).cloned()
    };

    let contact = match existing {
        Some(mut contact) => {
            contact.ip = ui::prompt_ip("IP", Some(&contact.ip))?;
            contact.fingerprint =
                ui::prompt_fingerprint("Fingerprint", contact.fingerprint.as_ref())?;
            contact
        }
        None => {
            let ip = ui::prompt_ip("IP", None)?;
            let fingerprint = ui::prompt_fingerprint("Fingerprint", None)?;
            Contact::new(name, ip, fingerprint)
        }
    };

    let id = contact.id;
    let ip = contact.ip.clone();
    let fingerprint = contact.fingerprint.clone();

    match state.upsert_and_save(contact) {
        Ok(true) => ui::print_green("Contact saved."),
        Ok(false) => {
            ui::print_green("Contact updated.");
            warn_unsaved();
        }
        Err(err) => {
            ui::print_red(&format!("Saving the contact failed: {err}"));
            return Ok(());
        }
    }

    // A newly recorded fingerprint may vouch for messages that arrived
    // before the contact existed.
    if let Some(fingerprint) = fingerprint {
        let released = state.take_pending_for(&ip, &fingerprint);
        if !released.is_empty() {
            let count = released.len();
            for pending in released {
                if let Err(err) = state.append_and_save(id, pending.message) {
                    ui::print_red(&format!("Storing a held message failed: {err}"));
                    return Ok(());
                }
            }
            ui::print_green(&format!("{count} held message(s) from {ip} moved into history."));
        }
    }
    Ok(())
}
