use std::collections::HashSet;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::{
    include_res,
    models::Message,
    res::{escape, fill, markdown},
    sync::RoomState,
};

/// Everything but unreserved characters gets encoded inside a path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

fn author(user_id: Uuid, me: Uuid) -> String {
    if user_id == me {
        "you".to_owned()
    } else {
        let simple = user_id.simple().to_string();
        format!("user {}", &simple[simple.len() - 8..])
    }
}

fn file_href(path: &str) -> String {
    let encoded: Vec<String> =
        path.split('/').map(|segment| utf8_percent_encode(segment, SEGMENT).to_string()).collect();
    format!("/files/{}", encoded.join("/"))
}

pub(crate) fn msg_to_html(message: &Message, me: Uuid) -> String {
    let id = message.id.to_string();
    let created_at = message.created_at.format(&Rfc3339).unwrap_or_default();
    let edited = if message.edited_at.is_some() { " (edited)" } else { "" };

    let file = match &message.file_url {
        Some(path) => {
            let name = path.rsplit('/').next().unwrap_or(path);
            format!(
                "<a class='file' href='{}' target='_blank'>{}</a>",
                escape(&file_href(path)),
                escape(name)
            )
        }
        None => String::new(),
    };

    // edit/delete are only offered on your own messages; the backend owns the real rule
    let actions = if message.user_id == me {
        fill(include_res!(str, "/pages/rooms/actions.html"), &[("id", &id)])
    } else {
        String::new()
    };

    fill(
        include_res!(str, "/pages/rooms/message.html"),
        &[
            ("id", &id),
            ("author", &author(message.user_id, me)),
            ("created_at", &created_at),
            ("edited", edited),
            ("file", &file),
            ("actions", &actions),
            ("content", &markdown(&message.content)),
        ],
    )
}

pub(crate) fn messages_html(state: &RoomState, me: Uuid) -> String {
    state.messages.iter().map(|message| msg_to_html(message, me)).collect()
}

/// "someone is typing" line, leaving yourself out.
pub(crate) fn typing_line(state: &RoomState, me: Uuid) -> String {
    let others: HashSet<Uuid> = state.typing.iter().copied().filter(|id| *id != me).collect();
    match others.len() {
        0 => String::new(),
        1 => "Someone is typing…".to_owned(),
        n => format!("{n} people are typing…"),
    }
}
