// Command routing: turns one inbound message into one reply.
//
// Users in the middle of a join conversation have every message routed to
// the JoinFlow. Everyone else is matched against the menu commands.

use std::sync::Arc;

use santa_core::config::Config;
use santa_core::model::UserId;
use santa_core::{JoinFlow, SantaError, SessionCoordinator, SessionStore};
use tracing::{debug, warn};

/// Menu commands. Each accepts a slash command and the menu button label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    NewGame,
    JoinGame,
    MyGame,
    Participants,
    Draw,
    WhoDoIGift,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim().to_lowercase();
        let cmd = match text.as_str() {
            "/start" => Command::Start,
            "/help" | "help" => Command::Help,
            "/new" | "create game" => Command::NewGame,
            "/join" | "join game" => Command::JoinGame,
            "/my" | "my game" => Command::MyGame,
            "/list" | "participants" => Command::Participants,
            "/draw" | "run draw" => Command::Draw,
            "/gift" | "who do i gift?" | "who do i gift" => Command::WhoDoIGift,
            _ => return None,
        };
        Some(cmd)
    }
}

const MENU: &str = "\
Menu:
  /new   - create game
  /join  - join game
  /my    - my game
  /list  - participants
  /draw  - run draw (organizer)
  /gift  - who do I gift?
  /help  - help";

const HELP: &str = "\
Secret Santa in three steps:
1. The organizer creates a game with /new and shares the 6-character code.
2. Everyone joins with /join, enters the code, a name and their wishes.
3. Once at least 3 people are in, the organizer runs /draw.
After the draw, /gift tells you who you are giving a present to.
Creating a new game discards your previous game if it has not been drawn yet.";

const GENERIC_FAILURE: &str = "Something went wrong, please try again later.";

/// Routes messages to the join conversation or the organizer operations.
pub struct Dispatcher {
    coordinator: SessionCoordinator,
    flow: JoinFlow,
}

impl Dispatcher {
    pub fn new(store: Arc<SessionStore>, config: &Config) -> Self {
        Self {
            coordinator: SessionCoordinator::new(Arc::clone(&store), &config.draw),
            flow: JoinFlow::new(store, &config.join),
        }
    }

    /// Handle one message from `user_id` and return the reply text.
    pub fn dispatch(&self, user_id: UserId, text: &str) -> String {
        if let Some(reply) = self.flow.handle(user_id, text) {
            return reply.to_string();
        }

        match Command::parse(text) {
            Some(cmd) => {
                debug!(user_id, ?cmd, "command received");
                self.run_command(user_id, cmd)
            }
            None => format!("I don't know that command.\n\n{MENU}"),
        }
    }

    fn run_command(&self, user_id: UserId, cmd: Command) -> String {
        let result = match cmd {
            Command::Start => Ok(format!("Welcome to Secret Santa!\n\n{MENU}")),
            Command::Help => Ok(format!("{HELP}\n\n{MENU}")),
            Command::NewGame => self.new_game(user_id),
            Command::JoinGame => Ok(self.flow.start(user_id).to_string()),
            Command::MyGame => self.my_game(user_id),
            Command::Participants => self.participants(user_id),
            Command::Draw => self.draw(user_id),
            Command::WhoDoIGift => self.who_do_i_gift(user_id),
        };

        result.unwrap_or_else(|e| {
            if e.is_recoverable() {
                capitalize(&e.to_string())
            } else {
                warn!(user_id, ?cmd, "command failed: {e}");
                GENERIC_FAILURE.to_string()
            }
        })
    }

    fn new_game(&self, user_id: UserId) -> Result<String, SantaError> {
        let previous = self
            .coordinator
            .whose_game(user_id)?
            .filter(|s| s.organizer_id == user_id && !s.is_drawn);
        let discarded = match previous {
            Some(old) => {
                let count = self.coordinator.list_participants(&old.code)?.len();
                format!(
                    "\n\nYour previous game {} and its {count} participant(s) were discarded.",
                    old.code
                )
            }
            None => String::new(),
        };

        let code = self.coordinator.create(user_id)?;
        Ok(format!(
            "Game created! Your code is {code}\n\
             Share it with the participants so they can /join.{discarded}"
        ))
    }

    fn my_game(&self, user_id: UserId) -> Result<String, SantaError> {
        let Some(session) = self.coordinator.whose_game(user_id)? else {
            return Ok(not_in_game());
        };
        let count = self.coordinator.list_participants(&session.code)?.len();
        let role = if session.organizer_id == user_id {
            "organizer"
        } else {
            "participant"
        };
        let status = if session.is_drawn {
            "the draw is done"
        } else {
            "waiting for the draw"
        };
        Ok(format!(
            "Game {}\nYou are the {role}.\nParticipants: {count}\nStatus: {status}\nCreated: {}",
            session.code,
            session.created_at.format("%Y-%m-%d %H:%M UTC")
        ))
    }

    fn participants(&self, user_id: UserId) -> Result<String, SantaError> {
        let Some(session) = self.coordinator.whose_game(user_id)? else {
            return Ok(not_in_game());
        };
        let participants = self.coordinator.list_participants(&session.code)?;
        if participants.is_empty() {
            return Ok(format!("Nobody has joined game {} yet.", session.code));
        }

        let mut lines = vec![format!(
            "Participants of game {} ({}):",
            session.code,
            participants.len()
        )];
        for (i, p) in participants.iter().enumerate() {
            lines.push(format!("{}. {} - {}", i + 1, p.name, wishes_or_default(&p.wishes)));
        }
        Ok(lines.join("\n"))
    }

    fn draw(&self, user_id: UserId) -> Result<String, SantaError> {
        let session = match self.coordinator.whose_game(user_id)? {
            Some(s) if s.organizer_id == user_id => s,
            Some(_) => return Ok("Only the organizer can run the draw.".into()),
            None => return Ok("You don't have a game yet. Create one with /new.".into()),
        };
        let summary = self.coordinator.run_draw(&session.code)?;
        Ok(format!(
            "The draw for game {} is done! {} participants each have someone to gift.\n\
             Everyone can now use /gift to find out who.",
            session.code, summary.participants
        ))
    }

    fn who_do_i_gift(&self, user_id: UserId) -> Result<String, SantaError> {
        let Some(session) = self.coordinator.whose_game(user_id)? else {
            return Ok(not_in_game());
        };
        if !session.is_drawn {
            return Ok(format!(
                "The draw for game {} has not happened yet.",
                session.code
            ));
        }
        match self.coordinator.get_assignment_for(user_id, &session.code)? {
            Some(target) => Ok(format!(
                "You are gifting {}!\nTheir wishes: {}",
                target.receiver_name,
                wishes_or_default(&target.receiver_wishes)
            )),
            None => Ok(format!("You are not a participant of game {}.", session.code)),
        }
    }
}

fn not_in_game() -> String {
    "You are not in any game yet. Use /join to join one or /new to create one.".into()
}

fn wishes_or_default(wishes: &str) -> &str {
    if wishes.is_empty() {
        "no preference"
    } else {
        wishes
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
