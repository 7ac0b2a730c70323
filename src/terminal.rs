use crate::connection::Status;
use crate::render::{ MessageList, NodeId };

pub const HELP: &str = "\
Commands:
  <text>              send a message to the room
  /pm <user> <text>   private message
  /consult <text>     ask staff for a consultation
  /staff              list online staff
  /html <path>        save the conversation as HTML
  /leave              leave the chat";

/// Prints newly rendered nodes and status changes to stdout.
#[derive(Debug, Default)]
pub struct Terminal {
    printed: NodeId,
    status: Option<Status>,
}

impl Terminal {
    pub fn flush(&mut self, list: &MessageList) {
        for entry in list.since(self.printed) {
            println!("{}", entry.node.to_text());
            self.printed = entry.id;
        }
    }

    pub fn show_status(&mut self, status: &Status) {
        if self.status.as_ref() == Some(status) {
            return;
        }
        println!("[{}] {}", status.class.as_str(), status.text);
        self.status = Some(status.clone());
    }
}
