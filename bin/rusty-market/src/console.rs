//! Line-oriented console standing in for the UI layer.
//!
//! One command per line; user-facing failures are printed and the loop
//! continues. Only stdin/stdout errors end the session.

use anyhow::Context;
use rm_core::error::{ErrorKind, MarketError};
use rm_core::models::{ListingDraft, ListingPatch, Product, PublicUser, ReportKind, UserFilter};
use rm_services::{ListingFeed, Market};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

const HELP: &str = "\
account:   register <user> <password> [bio...] | login <user> <password> | logout | whoami
           bio <text...> | passwd <old> <new> | balance <amount>
market:    list | show <id> | sell <price> <image-url> <title...> | <description...>
           buy <id> | edit <id> <title|description|price|image> <value...> | delete <id>
           history
chat:      say <text...> | dm <user> <text...> | board | chat <user> | unsay <id>
reports:   report <user|post|chat|product> <user> [content-id] <reason...>
admin:     reports | dismiss <id> | act <id> | ban <user> <days> | unban <user> | sweep
           users [--banned] [--admins]
           help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register {
        username: String,
        password: String,
        bio: Option<String>,
    },
    Login {
        username: String,
        password: String,
    },
    Logout,
    WhoAmI,
    Bio(String),
    Passwd { old: String, new: String },
    Balance(i64),
    List,
    Show(Uuid),
    Sell(ListingDraft),
    Buy(Uuid),
    Edit(Uuid, ListingPatch),
    Delete(Uuid),
    History,
    Say(String),
    Dm { to: String, body: String },
    Board,
    Chat(String),
    Unsay(Uuid),
    Report {
        kind: ReportKind,
        user: String,
        content_id: Option<String>,
        reason: String,
    },
    Reports,
    Dismiss(Uuid),
    Act(Uuid),
    Ban { username: String, days: i64 },
    Unban(String),
    Users(UserFilter),
    Sweep,
    Help,
    Quit,
}

/// Splits off the first whitespace-delimited word.
fn next_word(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    Some(match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (input, ""),
    })
}

fn word<'a>(rest: &mut &'a str, what: &str) -> Result<&'a str, String> {
    let (w, tail) = next_word(rest).ok_or_else(|| format!("missing {what}"))?;
    *rest = tail;
    Ok(w)
}

fn text(rest: &str, what: &str) -> Result<String, String> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(format!("missing {what}"));
    }
    Ok(rest.to_string())
}

fn id(raw: &str) -> Result<Uuid, String> {
    Uuid::parse_str(raw).map_err(|_| format!("'{raw}' is not a valid id"))
}

fn number(raw: &str) -> Result<i64, String> {
    raw.parse().map_err(|_| format!("'{raw}' is not a number"))
}

pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let Some((verb, mut rest)) = next_word(line) else {
        return Ok(None);
    };
    let rest = &mut rest;
    let cmd = match verb.to_ascii_lowercase().as_str() {
        "register" => Command::Register {
            username: word(rest, "username")?.to_string(),
            password: word(rest, "password")?.to_string(),
            bio: Some(rest.trim().to_string()).filter(|b| !b.is_empty()),
        },
        "login" => Command::Login {
            username: word(rest, "username")?.to_string(),
            password: word(rest, "password")?.to_string(),
        },
        "logout" => Command::Logout,
        "whoami" => Command::WhoAmI,
        "bio" => Command::Bio(rest.trim().to_string()),
        "passwd" => Command::Passwd {
            old: word(rest, "old password")?.to_string(),
            new: word(rest, "new password")?.to_string(),
        },
        "balance" => Command::Balance(number(word(rest, "amount")?)?),
        "list" => Command::List,
        "show" => Command::Show(id(word(rest, "product id")?)?),
        "sell" => {
            let price = number(word(rest, "price")?)?;
            let image_url = word(rest, "image url")?.to_string();
            let (title, description) = rest
                .split_once('|')
                .ok_or("expected '<title> | <description>'")?;
            Command::Sell(ListingDraft {
                title: title.trim().to_string(),
                description: description.trim().to_string(),
                price,
                image_url,
            })
        }
        "buy" => Command::Buy(id(word(rest, "product id")?)?),
        "edit" => {
            let product = id(word(rest, "product id")?)?;
            let field = word(rest, "field")?;
            let value = text(rest, "value")?;
            let mut patch = ListingPatch::default();
            match field {
                "title" => patch.title = Some(value),
                "description" => patch.description = Some(value),
                "price" => patch.price = Some(number(&value)?),
                "image" => patch.image_url = Some(value),
                other => return Err(format!("unknown field '{other}'")),
            }
            Command::Edit(product, patch)
        }
        "delete" => Command::Delete(id(word(rest, "product id")?)?),
        "history" => Command::History,
        "say" => Command::Say(text(rest, "message")?),
        "dm" => Command::Dm {
            to: word(rest, "recipient")?.to_string(),
            body: text(rest, "message")?,
        },
        "board" => Command::Board,
        "chat" => Command::Chat(word(rest, "user")?.to_string()),
        "unsay" => Command::Unsay(id(word(rest, "message id")?)?),
        "report" => {
            let kind: ReportKind = word(rest, "report type")?
                .parse()
                .map_err(|e: MarketError| e.to_string())?;
            let user = word(rest, "reported user")?.to_string();
            let content_id = if kind.needs_content_id() {
                Some(word(rest, "content id")?.to_string())
            } else {
                None
            };
            Command::Report {
                kind,
                user,
                content_id,
                reason: rest.trim().to_string(),
            }
        }
        "reports" => Command::Reports,
        "dismiss" => Command::Dismiss(id(word(rest, "report id")?)?),
        "act" => Command::Act(id(word(rest, "report id")?)?),
        "ban" => Command::Ban {
            username: word(rest, "username")?.to_string(),
            days: number(word(rest, "days")?)?,
        },
        "unban" => Command::Unban(word(rest, "username")?.to_string()),
        "users" => {
            let mut filter = UserFilter::default();
            while let Some((flag, tail)) = next_word(*rest) {
                match flag {
                    "--banned" => filter.with_ban_record = true,
                    "--admins" => filter.is_admin = Some(true),
                    other => return Err(format!("unknown users option '{other}'")),
                }
                *rest = tail;
            }
            Command::Users(filter)
        }
        "sweep" => Command::Sweep,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command '{other}', try 'help'")),
    };
    Ok(Some(cmd))
}

pub async fn run(market: &Market, feed: &ListingFeed) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("rusty-market console, 'help' lists commands");

    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let command = match parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(usage) => {
                println!("usage: {usage}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(e) = execute(market, feed, command).await {
            match e.kind() {
                ErrorKind::Storage => tracing::error!(error = %e, "command failed"),
                _ => tracing::debug!(error = %e, "command rejected"),
            }
            println!("error: {e}");
        }
    }
    Ok(())
}

async fn actor(market: &Market) -> Result<String, MarketError> {
    market
        .session
        .identity()
        .await
        .map(|i| i.username)
        .ok_or(MarketError::NotAuthenticated)
}

fn print_user(user: &PublicUser) {
    let role = if user.is_admin { " [admin]" } else { "" };
    println!("{}{role}  balance {}", user.username, user.balance);
    if let Some(bio) = &user.bio {
        println!("  {bio}");
    }
    if let Some(until) = user.banned_until {
        println!("  banned until {until}");
    }
}

fn print_product(p: &Product) {
    let status = match (&p.purchased_by, p.is_deleted) {
        (Some(buyer), _) => format!("sold to {buyer}"),
        (None, true) => "deleted".to_string(),
        (None, false) => "for sale".to_string(),
    };
    println!("{}  {:>10}  {}  by {} ({status})", p.id, p.price, p.title, p.author);
}

async fn execute(market: &Market, feed: &ListingFeed, command: Command) -> Result<(), MarketError> {
    match command {
        Command::Register { username, password, bio } => {
            let user = market.session.register(&username, &password, bio.as_deref()).await?;
            println!("registered {}, you can log in now", user.username);
        }
        Command::Login { username, password } => {
            let outcome = market.session.login(&username, &password).await?;
            println!("welcome, {}", outcome.user.username);
        }
        Command::Logout => {
            market.session.logout().await;
            println!("logged out");
        }
        Command::WhoAmI => match market.session.current_user().await? {
            Some(user) => print_user(&user),
            None => println!("not logged in"),
        },
        Command::Bio(text) => print_user(&market.session.update_bio(&text).await?),
        Command::Passwd { old, new } => {
            market.session.update_password(&old, &new).await?;
            println!("password changed");
        }
        Command::Balance(amount) => print_user(&market.session.update_balance(amount).await?),
        Command::List => {
            let listings = feed.latest().await;
            if listings.is_empty() {
                println!("no listings");
            }
            listings.iter().for_each(print_product);
        }
        Command::Show(product_id) => {
            let p = market.marketplace.get_product(product_id).await?;
            print_product(&p);
            println!("  {}\n  {}", p.description, p.image_url);
        }
        Command::Sell(draft) => {
            let me = actor(market).await?;
            let p = market.marketplace.create_listing(&draft, &me).await?;
            feed.refresh().await;
            println!("listed {}", p.id);
        }
        Command::Buy(product_id) => {
            let me = actor(market).await?;
            let receipt = market.marketplace.purchase(product_id, &me).await?;
            feed.refresh().await;
            println!(
                "bought '{}' for {}, balance now {}",
                receipt.product.title, receipt.product.price, receipt.balance
            );
        }
        Command::Edit(product_id, patch) => {
            let me = actor(market).await?;
            let p = market.marketplace.update_listing(product_id, &patch, &me).await?;
            feed.refresh().await;
            print_product(&p);
        }
        Command::Delete(product_id) => {
            let me = actor(market).await?;
            market.marketplace.soft_delete_listing(product_id, &me).await?;
            feed.refresh().await;
            println!("deleted {product_id}");
        }
        Command::History => {
            let me = actor(market).await?;
            println!("purchases:");
            market.marketplace.purchases_of(&me).await?.iter().for_each(print_product);
            println!("sales:");
            market.marketplace.sales_of(&me).await?.iter().for_each(print_product);
        }
        Command::Say(body) => {
            let me = actor(market).await?;
            let msg = market.chat.send_public(&me, &body).await?;
            println!("posted {}", msg.id);
        }
        Command::Dm { to, body } => {
            let me = actor(market).await?;
            market.chat.send_private(&me, &to, &body).await?;
            println!("sent to {to}");
        }
        Command::Board => {
            for m in market.chat.public_feed().await? {
                println!("{} [{}] {}: {}", m.id, m.created_at.format("%H:%M"), m.author, m.body);
            }
        }
        Command::Chat(other) => {
            let me = actor(market).await?;
            for m in market.chat.conversation(&me, &other).await? {
                println!("[{}] {}: {}", m.created_at.format("%H:%M"), m.author, m.body);
            }
        }
        Command::Unsay(message_id) => {
            let me = actor(market).await?;
            market.chat.delete_message(message_id, &me).await?;
            println!("message removed");
        }
        Command::Report { kind, user, content_id, reason } => {
            let me = actor(market).await?;
            let report = market
                .reports
                .report_content(kind, content_id.as_deref(), &user, &reason, &me)
                .await?;
            println!("report {} filed, thank you", report.id);
        }
        Command::Reports => {
            let me = actor(market).await?;
            for r in market.reports.list_reports(&me).await? {
                let target = r.content_id.as_deref().unwrap_or("-");
                println!(
                    "{}  {}  {} (target {target}) by {}: {}",
                    r.id, r.kind, r.reported_user, r.reported_by, r.reason
                );
            }
        }
        Command::Dismiss(report_id) => {
            let me = actor(market).await?;
            market.reports.dismiss_report(report_id, &me).await?;
            println!("report dismissed");
        }
        Command::Act(report_id) => {
            let me = actor(market).await?;
            let report = market.reports.act_on_report(report_id, &me).await?;
            feed.refresh().await;
            if report.kind == ReportKind::User {
                println!("report closed; use 'ban {}' to suspend the user", report.reported_user);
            } else {
                println!("{} removed", report.kind);
            }
        }
        Command::Ban { username, days } => {
            let me = actor(market).await?;
            print_user(&market.bans.ban(&username, days, &me).await?);
        }
        Command::Unban(username) => {
            let me = actor(market).await?;
            print_user(&market.bans.unban(&username, &me).await?);
        }
        Command::Users(filter) => {
            let me = actor(market).await?;
            market
                .bans
                .list_users(&me, &filter)
                .await?
                .iter()
                .for_each(print_user);
        }
        Command::Sweep => {
            let flipped = market.marketplace.sweep_expired_sales().await?;
            feed.refresh().await;
            println!("{flipped} expired sale(s) hidden");
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}
