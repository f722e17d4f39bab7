use std::{error::Error, io::BufRead, sync::Arc, thread};

use clap::{Parser, Subcommand};
use crossbeam_channel::{select, Receiver};
use roosty_alarm::{
    communication::{ChannelNotifier, Message, MessageType, Notifier},
    config::Config,
    persistence::{PersistenceGateway, TomlFileStore},
    Alarm, AlarmId, Engine,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config
    Init {
        #[clap(long, short)]
        force: bool,
    },
    /// Add an alarm, e.g. `add 7:30 "Wake up!" --repeat`
    Add {
        time: String,
        message: Option<String>,
        #[clap(long, short)]
        sound: Option<String>,
        #[clap(long, short)]
        repeat: bool,
        /// minutes, 1 to 1439
        #[clap(long)]
        snooze: Option<u32>,
    },
    Remove {
        id: AlarmId,
    },
    Disable {
        id: AlarmId,
    },
    Enable {
        id: AlarmId,
    },
    List,
    /// Ring alarms until `quit` (the default)
    Run,
}

fn main() -> Result<(), Box<dyn Error>> {
    // initilize the logger
    simple_file_logger::init_logger!("roosty_alarm").expect("couldn't initialize logger");
    let args = Args::parse();
    if let Some(Command::Init { force }) = args.command {
        if force || !Config::is_config_present() {
            let path = Config::config_path()?;
            Config::new().save(path.clone())?;
            std::fs::create_dir_all(Config::sounds_path()?)?;
            println!("wrote {}", path.display());
        } else {
            println!("config already exists, use --force to overwrite it");
        }
        return Ok(());
    }

    let config = Config::load_or_default(Config::config_path()?)?;
    let (channel, messages) = ChannelNotifier::new();
    let engine = open_engine(&config, notifier(&config, channel))?;

    match args.command.unwrap_or(Command::Run) {
        Command::Add {
            time,
            message,
            sound,
            repeat,
            snooze,
        } => {
            let id = engine.add_alarm(config.alarm_spec(time, message, sound, repeat, snooze))?;
            println!("added alarm {id}");
        }
        Command::Remove { id } => engine.remove_alarm(id)?,
        Command::Disable { id } => engine.disable_alarm(id)?,
        Command::Enable { id } => engine.enable_alarm(id)?,
        Command::List => print_alarms(&engine.list_alarms(), &config),
        Command::Run => run(&engine, &messages, &config)?,
        // written before the engine is opened
        Command::Init { .. } => {}
    }
    engine.flush();
    Ok(())
}

fn open_engine(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Engine, Box<dyn Error>> {
    let store = TomlFileStore::new(config.alarms_path()?);
    // the engine starts empty on a bad file, which would then get overwritten
    store.load_all()?;
    log::info!("using alarms from {}", store.path().display());
    Ok(Engine::builder()
        .notifier(notifier)
        .persistence(Arc::new(store))
        .tick_interval(config.tick_interval())
        .build()?)
}

#[cfg_attr(not(feature = "sound"), allow(unused_variables))]
fn notifier(config: &Config, channel: ChannelNotifier) -> Arc<dyn Notifier> {
    #[cfg(feature = "sound")]
    {
        use roosty_alarm::{communication::Broadcast, sound::SoundNotifier};
        match SoundNotifier::spawn(config.sounds.clone(), config.volume) {
            Ok(sound) => {
                return Arc::new(
                    Broadcast::default()
                        .with(Arc::new(channel))
                        .with(Arc::new(sound)),
                )
            }
            Err(e) => log::warn!("alarms will be silent: {e}"),
        }
    }
    Arc::new(channel)
}

fn print_alarms(alarms: &[Alarm], config: &Config) {
    if alarms.is_empty() {
        println!("no alarms");
    }
    for alarm in alarms {
        println!(
            "{:>4}  {}  {:<8}  {} ({})",
            alarm.id,
            alarm.time().format(&config.time_format),
            alarm.state,
            alarm.message,
            if alarm.repeat_daily { "Daily" } else { "Once" }
        );
    }
}

enum Input {
    Message(Message),
    Line(String),
    Closed,
}

fn run(
    engine: &Engine,
    messages: &Receiver<Message>,
    config: &Config,
) -> Result<(), Box<dyn Error>> {
    let (lines_tx, lines) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if lines_tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    engine.start()?;
    println!("waiting for alarms, commands: snooze <id>, dismiss <id>, stop, list, quit");
    loop {
        let input = select! {
            recv(messages) -> message => message.map_or(Input::Closed, Input::Message),
            recv(lines) -> line => line.map_or(Input::Closed, Input::Line),
        };
        match input {
            Input::Message(Message {
                kind: MessageType::AlarmTriggered { message, .. },
                alarm_id,
            }) => println!("alarm {alarm_id} ringing: {message}"),
            Input::Message(Message {
                kind: MessageType::AlarmStopped,
                alarm_id,
            }) => log::debug!("alarm {alarm_id} silenced"),
            Input::Line(line) => {
                if !handle_line(engine, config, &line) {
                    break;
                }
            }
            // stdin closed
            Input::Closed => break,
        }
    }
    engine.stop();
    Ok(())
}

/// Returns false once the user asks to quit.
fn handle_line(engine: &Engine, config: &Config, line: &str) -> bool {
    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();
    let id = words.next().map(str::parse::<AlarmId>);
    let result = match (command, id) {
        ("", _) => Ok(()),
        ("quit" | "exit" | "q", _) => return false,
        ("list" | "ls", _) => {
            print_alarms(&engine.list_alarms(), config);
            Ok(())
        }
        ("stop", _) => {
            match engine.dismiss_all().as_slice() {
                [] => println!("nothing is ringing"),
                ids => println!("dismissed {ids:?}"),
            }
            Ok(())
        }
        ("snooze" | "s", Some(Ok(id))) => engine.snooze_firing(id),
        ("dismiss" | "d", Some(Ok(id))) => engine.dismiss_firing(id),
        ("snooze" | "s" | "dismiss" | "d", None) => match engine.firing_alarms().as_slice() {
            // only one ringing, no need to say which
            [alarm] if command.starts_with('s') => engine.snooze_firing(alarm.id),
            [alarm] => engine.dismiss_firing(alarm.id),
            [] => {
                println!("nothing is ringing");
                Ok(())
            }
            _ => {
                println!("more than one alarm is ringing, give an id or `stop` them all");
                Ok(())
            }
        },
        (_, Some(Err(e))) => {
            println!("bad alarm id: {e}");
            Ok(())
        }
        _ => {
            println!("unknown command {command:?}");
            Ok(())
        }
    };
    if let Err(e) = result {
        println!("{e}");
    }
    true
}
