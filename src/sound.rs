//! Plays ringing alarms through the default audio device.

use std::{collections::HashMap, fs::File, io::BufReader, thread, time::Duration};

use crossbeam_channel::Sender;
use rodio::{source::SineWave, Decoder, OutputStreamBuilder, Sink, Source};

use crate::{
    alarm::{Alarm, AlarmId},
    communication::{Message, MessageType, Notifier},
    config::Sound,
    error::NotifierError,
};

/// Pitch of the built-in profiles, used when no sound file is configured.
fn tone_frequency(profile: &str) -> f32 {
    match profile.to_lowercase().as_str() {
        "high pitch" => 1000.0,
        "low pitch" => 200.0,
        "pulse" => 500.0,
        _ => 440.0,
    }
}

/// A [`Notifier`] that rings until silenced.
///
/// The audio output lives on its own thread; `notify` just posts a message to it.
#[derive(Debug, Clone)]
pub struct SoundNotifier {
    sender: Sender<Message>,
}

impl SoundNotifier {
    /// Opens the default output device and starts the playback thread.
    ///
    /// # Errors
    /// [`NotifierError::Unavailable`] if there is no usable audio device.
    pub fn spawn(sounds: HashMap<String, Sound>, volume: f32) -> Result<Self, NotifierError> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Message>();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        thread::Builder::new()
            .name("alarm-sound".to_string())
            .spawn(move || {
                let stream_handle = match OutputStreamBuilder::open_default_stream() {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let mut alarm_map: HashMap<AlarmId, Sink> = HashMap::new();
                for Message { kind, alarm_id } in receiver {
                    match kind {
                        MessageType::AlarmTriggered { sound, .. } => {
                            let sink = Sink::connect_new(stream_handle.mixer());
                            sink.set_volume(volume / 100.0);
                            append_sound(&sink, sounds.get(&sound), &sound);
                            sink.play();
                            if let Some(old) = alarm_map.insert(alarm_id, sink) {
                                old.stop();
                            }
                        }
                        MessageType::AlarmStopped => {
                            if let Some(sink) = alarm_map.remove(&alarm_id) {
                                log::debug!("alarm {alarm_id} stopped");
                                sink.stop();
                            }
                        }
                    }
                }
            })
            .map_err(|e| NotifierError::Unavailable(e.to_string()))?;
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { sender }),
            Ok(Err(e)) => Err(NotifierError::Unavailable(e)),
            Err(_) => Err(NotifierError::Unavailable(
                "sound thread exited during startup".to_string(),
            )),
        }
    }
}

/// Queues the sound on repeat: the configured file if there is one and it
/// decodes, a synthesized tone otherwise.
fn append_sound(sink: &Sink, file: Option<&Sound>, profile: &str) {
    if let Some(file) = file {
        match File::open(&file.path)
            .map_err(|e| e.to_string())
            .and_then(|f| Decoder::new(BufReader::new(f)).map_err(|e| e.to_string()))
        {
            Ok(decoder) => {
                sink.append(decoder.repeat_infinite());
                return;
            }
            Err(e) => log::warn!("couldn't play {file}, using a tone instead: {e}"),
        }
    }
    // beep on and off, like a bedside clock
    let beep = SineWave::new(tone_frequency(profile))
        .take_duration(Duration::from_millis(250))
        .amplify(0.5);
    let gap = SineWave::new(tone_frequency(profile))
        .take_duration(Duration::from_millis(250))
        .amplify(0.0);
    sink.append(beep.mix(gap.delay(Duration::from_millis(250))).repeat_infinite());
}

impl Notifier for SoundNotifier {
    fn notify(&self, alarm: &Alarm) -> Result<(), NotifierError> {
        self.sender
            .send(Message::new(
                MessageType::AlarmTriggered {
                    message: alarm.message.clone(),
                    sound: alarm.sound.clone(),
                },
                alarm.id,
            ))
            .map_err(|_| NotifierError::Disconnected)
    }

    fn silence(&self, id: AlarmId) -> Result<(), NotifierError> {
        self.sender
            .send(Message::new(MessageType::AlarmStopped, id))
            .map_err(|_| NotifierError::Disconnected)
    }
}
