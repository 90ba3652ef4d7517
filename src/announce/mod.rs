//! Announcements: spoken and visual notifications.
//!
//! The [`AnnouncementDispatcher`] sits between navigation events and the
//! [`SpeechPort`]. Wording lives in [`text`].

mod dispatcher;
mod speech;
pub mod text;

pub use dispatcher::{
    AnnounceConfig, Announcement, AnnouncementDispatcher, AnnouncementKind, Notice,
};
pub use speech::{LogSpeech, MockSpeech, SpeechError, SpeechPort};
