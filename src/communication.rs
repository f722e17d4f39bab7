use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::{
    alarm::{Alarm, AlarmId},
    error::NotifierError,
};

/// Tells the user an alarm is ringing.
///
/// Called from the ticker thread, so implementations must hand the work off and
/// return straight away. The user's answer comes back later through
/// [`Engine::snooze_firing`](crate::Engine::snooze_firing) or
/// [`Engine::dismiss_firing`](crate::Engine::dismiss_firing).
pub trait Notifier: Send + Sync {
    /// # Errors
    /// If delivery couldn't even be scheduled. The alarm fires regardless.
    fn notify(&self, alarm: &Alarm) -> Result<(), NotifierError>;

    /// The alarm stopped ringing (snoozed, dismissed, disabled, edited or removed).
    ///
    /// # Errors
    /// If the stop couldn't be delivered.
    fn silence(&self, _id: AlarmId) -> Result<(), NotifierError> {
        Ok(())
    }
}

/// Writes alarms to the log and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, alarm: &Alarm) -> Result<(), NotifierError> {
        log::info!("alarm {} ringing: {}", alarm.id, alarm);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub alarm_id: AlarmId,
}

impl Message {
    #[must_use]
    pub const fn new(kind: MessageType, alarm_id: AlarmId) -> Self {
        Self { kind, alarm_id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    AlarmTriggered { message: String, sound: String },
    // if the alarm is snoozed/dismissed/disabled/removed/time changed
    AlarmStopped,
}

/// Forwards alarms as [`Message`]s to whoever holds the receiving end.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: Sender<Message>,
}

impl ChannelNotifier {
    #[must_use]
    pub fn new() -> (Self, Receiver<Message>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }

    #[must_use]
    pub const fn from_sender(sender: Sender<Message>) -> Self {
        Self { sender }
    }

    fn send(&self, message: Message) -> Result<(), NotifierError> {
        self.sender
            .send(message)
            .map_err(|_| NotifierError::Disconnected)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, alarm: &Alarm) -> Result<(), NotifierError> {
        self.send(Message::new(
            MessageType::AlarmTriggered {
                message: alarm.message.clone(),
                sound: alarm.sound.clone(),
            },
            alarm.id,
        ))
    }

    fn silence(&self, id: AlarmId) -> Result<(), NotifierError> {
        self.send(Message::new(MessageType::AlarmStopped, id))
    }
}

/// Hands every call to each inner notifier.
///
/// All of them are tried; the first error (if any) is returned.
#[derive(Clone, Default)]
pub struct Broadcast(Vec<Arc<dyn Notifier>>);

impl std::fmt::Debug for Broadcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Broadcast").field(&self.0.len()).finish()
    }
}

impl Broadcast {
    #[must_use]
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self(notifiers)
    }

    #[must_use]
    pub fn with(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.0.push(notifier);
        self
    }

    fn each(
        &self,
        call: impl Fn(&dyn Notifier) -> Result<(), NotifierError>,
    ) -> Result<(), NotifierError> {
        self.0
            .iter()
            .map(|notifier| call(notifier.as_ref()))
            .fold(Ok(()), |first, result| first.and(result))
    }
}

impl Notifier for Broadcast {
    fn notify(&self, alarm: &Alarm) -> Result<(), NotifierError> {
        self.each(|notifier| notifier.notify(alarm))
    }

    fn silence(&self, id: AlarmId) -> Result<(), NotifierError> {
        self.each(|notifier| notifier.silence(id))
    }
}
