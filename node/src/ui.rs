//! Terminal surface: colored output, prompts with validation, and the
//! rendering of contacts and conversations.

use std::io::{self, Write};
use std::net::Ipv4Addr;

use colored::Colorize;
use sidewinder_crypto_core::Fingerprint;
use sidewinder_messaging::{Contact, ContactBook};
use zeroize::Zeroizing;

pub fn banner() {
    print_green("/////////////////////////");
    print_green("// s i d e w i n d e r //");
    print_green("/////////////////////////");
}

pub fn print_green(msg: &str) {
    println!("{}", msg.green());
}

pub fn print_yellow(msg: &str) {
    println!("{}", msg.yellow());
}

pub fn print_red(msg: &str) {
    println!("{}", msg.red());
}

pub fn print_help() {
    println!("Commands: send, list, view <contact>, add, help, quit");
}

/// One command-loop action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send,
    List,
    View(Option<String>),
    Add,
    Help,
    Quit,
}

/// Prompt until the user enters a recognized command.
pub fn prompt_command() -> io::Result<Command> {
    loop {
        let line = prompt("> ")?;
        let mut parts = line.split_whitespace();
        let head = parts.next().map(str::to_ascii_lowercase);
        let rest = parts.collect::<Vec<_>>().join(" ");
        match head.as_deref() {
            Some("send") => return Ok(Command::Send),
            Some("list") => return Ok(Command::List),
            Some("view") => {
                return Ok(Command::View((!rest.is_empty()).then_some(rest)));
            }
            Some("add") => return Ok(Command::Add),
            Some("help") => return Ok(Command::Help),
            Some("quit") | Some("exit") => return Ok(Command::Quit),
            Some(_) => print_red("Invalid command. Please try again."),
            None => {}
        }
    }
}

/// Print the prompt on one line and return the trimmed reply.
pub fn prompt(msg: &str) -> io::Result<String> {
    print!("{msg}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Prompt with a default shown in brackets; empty input keeps it.
pub fn prompt_default(msg: &str, default: &str) -> io::Result<String> {
    let reply = prompt(&format!("{msg} [{default}]: "))?;
    Ok(if reply.is_empty() {
        default.to_string()
    } else {
        reply
    })
}

/// No-echo password prompt.
pub fn prompt_password(msg: &str) -> io::Result<Zeroizing<String>> {
    Ok(Zeroizing::new(rpassword::prompt_password(msg)?))
}

/// Prompt for a new password, with confirmation, until both entries
/// match.
pub fn prompt_new_password() -> io::Result<Zeroizing<String>> {
    loop {
        let first = prompt_password("Password: ")?;
        let second = prompt_password("Confirm password: ")?;
        if *first == *second {
            return Ok(first);
        }
        print_red("Your passwords do not match. Please try again:");
    }
}

/// Yellow y/N confirmation; only `y` or `Y` is a yes.
pub fn confirm(msg: &str) -> io::Result<bool> {
    print!("{}", msg.yellow());
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().eq_ignore_ascii_case("y"))
}

/// Prompt until the user enters a valid dotted-quad IPv4 address.
pub fn prompt_ip(msg: &str, default: Option<&str>) -> io::Result<String> {
    loop {
        let reply = match default {
            Some(default) => prompt_default(msg, default)?,
            None => prompt(&format!("{msg}: "))?,
        };
        if reply.parse::<Ipv4Addr>().is_ok() {
            return Ok(reply);
        }
        print_red("\nInvalid IP address. Please try again.");
    }
}

/// Prompt until the user enters a well-formed fingerprint, or nothing.
pub fn prompt_fingerprint(msg: &str, default: Option<&Fingerprint>) -> io::Result<Option<Fingerprint>> {
    loop {
        let reply = match default {
            Some(default) => prompt_default(msg, default.as_str())?,
            None => prompt(&format!("{msg}: "))?,
        };
        if reply.is_empty() {
            return Ok(None);
        }
        match Fingerprint::parse(&reply) {
            Some(fingerprint) => return Ok(Some(fingerprint)),
            None => print_red("\nThat is not a valid fingerprint. Please try again."),
        }
    }
}

/// `list` view: one line per contact with the latest message preview.
pub fn render_contact_list(book: &ContactBook) {
    if book.is_empty() {
        print_yellow("No contacts yet. Use 'add' to create one.");
        return;
    }
    for contact in book.iter() {
        match contact.last_message() {
            Some(message) => {
                println!(
                    "{:10}  >  {:30}  <  {}",
                    contact.name,
                    preview(&message.contents),
                    message.time
                );
            }
            None => {
                println!("{:10}  >  {:^30}  <", contact.name, "-- No messages --");
            }
        }
    }
    println!();
}

/// `view` output: contact card followed by the conversation.
pub fn render_conversation(contact: &Contact) {
    render_contact_card(contact);
    print_bar("CONVERSATION");
    for message in &contact.messages {
        let speaker = if message.received {
            contact.name.as_str()
        } else {
            "me"
        };
        println!("{} {}: {}", message.time, speaker, message.contents);
    }
    println!();
}

pub fn render_contact_card(contact: &Contact) {
    print_green(&contact.name);
    println!("IP: {}", contact.ip);
    match &contact.fingerprint {
        Some(fingerprint) => println!("Fingerprint: {fingerprint}"),
        None => print_yellow("Fingerprint: (none recorded -- messaging disabled)"),
    }
    println!();
}

fn preview(contents: &str) -> String {
    if contents.chars().count() <= 30 {
        contents.to_string()
    } else {
        let head: String = contents.chars().take(27).collect();
        format!("{head}...")
    }
}

fn print_bar(msg: &str) {
    let pad = "-".repeat(16usize.saturating_sub(msg.len() / 2));
    println!("{pad} {msg} {pad}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_trims_long_messages() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(60);
        let trimmed = preview(&long);
        assert_eq!(trimmed.chars().count(), 30);
        assert!(trimmed.ends_with("..."));
    }
}
