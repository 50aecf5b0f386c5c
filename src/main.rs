use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser;
use tone_player::config::is_song_file;
use tone_player::{
    CpalEngine, EventLoop, NoteSequence, Player, PlayerSettings, Result, SessionContext, Song,
};

/// Play a song file, an audio file, or a built-in demo melody
#[derive(Parser, Debug)]
#[command(name = "tone-player")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Plays note sequences and audio files", long_about = None)]
struct Args {
    /// Song (.ron or .json) or audio file; plays a demo melody when omitted
    #[arg(value_name = "FILE")]
    path: Option<PathBuf>,

    /// Override the tempo, in beats per minute
    #[arg(long)]
    bpm: Option<f64>,

    /// Show debug logs
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn log_level(&self) -> log::Level {
        if self.verbose {
            log::Level::Debug
        } else if self.quiet {
            log::Level::Warn
        } else {
            log::Level::Info
        }
    }
}

/// C major scale, then a C major chord held for a whole note
fn demo_song() -> Result<Song> {
    let mut triples: Vec<(f64, Option<f64>)> = [0.0, 2.0, 4.0, 5.0, 7.0, 9.0, 11.0, 12.0]
        .iter()
        .map(|&pitch| (8.0, Some(pitch)))
        .collect();
    triples.push((4.0, None));
    triples.push((1.0, Some(0.0)));
    triples.push((0.0, Some(4.0)));
    triples.push((0.0, Some(7.0)));

    Ok(Song {
        bpm: 90.0,
        settings: PlayerSettings::default(),
        notes: NoteSequence::from_triples(&triples)?,
    })
}

fn run(args: Args) -> Result<()> {
    let event_loop = Rc::new(EventLoop::new());
    let session = SessionContext::new();
    let engine = CpalEngine::new(event_loop.clone())?;

    let (settings, bpm, source) = match &args.path {
        Some(path) if is_song_file(path) => {
            let song = Song::load(path)?;
            log::info!("Loaded song {}", path.display());
            (song.settings, song.bpm, Some(song.notes))
        }
        Some(_) => (PlayerSettings::default(), tone_player::sequencer::tempo::DEFAULT_BPM, None),
        None => {
            let song = demo_song()?;
            (song.settings, song.bpm, Some(song.notes))
        }
    };

    let player = Player::new(engine, event_loop.clone(), &session, settings);
    player.set_bpm(args.bpm.unwrap_or(bpm))?;

    match (source, &args.path) {
        (Some(notes), _) => player.load_notes(notes)?,
        (None, Some(path)) => {
            let bytes = std::fs::read(path)?;
            player.load_file(bytes)?;
            log::info!("Loaded audio file {}", path.display());
        }
        (None, None) => return Ok(()),
    }

    // Launching from the command line counts as the user's go-ahead
    session.notify_first_interaction();

    let done = Rc::new(Cell::new(false));
    let flag = Rc::clone(&done);
    player.set_on_end(move || flag.set(true));

    player.play()?;
    log::info!("Playing at {} bpm", player.bpm());
    event_loop.run_realtime(|| !done.get());

    player.end();
    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(e) = simple_logger::init_with_level(args.log_level()) {
        eprintln!("Logger init failed: {}", e);
    }

    if let Err(e) = run(args) {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}
