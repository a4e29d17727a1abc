// MIDI output for rendered progressions.
//
// Writes a Standard MIDI File (SMF Format 1) with a tempo track and one piano
// track. Every chord is a block chord: all of its notes start together and are
// held for a whole 4/4 bar before the next chord begins. A chord with no notes
// becomes a bar of silence. Notes outside the MIDI range are skipped.
//
// Uses the `midly` crate for MIDI writing.

use crate::context::RenderedChord;
use crate::error::ModelError;
use midly::{
    Format, Header, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Ticks per quarter note in MIDI output.
const TICKS_PER_QUARTER: u16 = 480;

/// Each chord lasts four quarter notes.
const TICKS_PER_CHORD: u32 = TICKS_PER_QUARTER as u32 * 4;

pub const DEFAULT_TEMPO_BPM: u16 = 120;

const VELOCITY: u8 = 90;

const MAX_NOTE: u8 = 127;

/// Render chords to MIDI and write them to `path`, replacing any existing file.
/// The bytes go to a sibling temp file first and are renamed into place, so a
/// concurrent reader sees either the old file or the new one, never a partial
/// write.
pub fn write_midi(chords: &[RenderedChord], tempo_bpm: u16, path: &Path) -> Result<(), ModelError> {
    let to_artifact_error = |source: io::Error| ModelError::ArtifactWriteFailure {
        path: path.to_path_buf(),
        source,
    };
    let buf = progression_to_bytes(chords, tempo_bpm).map_err(to_artifact_error)?;
    let temp = temp_path(path).map_err(to_artifact_error)?;
    if let Err(e) = std::fs::write(&temp, &buf).and_then(|()| std::fs::rename(&temp, path)) {
        let _ = std::fs::remove_file(&temp);
        return Err(to_artifact_error(e));
    }
    log::debug!("wrote {} chords ({} bytes) to {}", chords.len(), buf.len(), path.display());
    Ok(())
}

/// `dir/.name.tmp` next to `path`.
fn temp_path(path: &Path) -> io::Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "MIDI path has no file name")
    })?;
    let mut temp_name = OsString::from(".");
    temp_name.push(name);
    temp_name.push(".tmp");
    Ok(path.with_file_name(temp_name))
}

/// Render chords to an in-memory MIDI file.
pub fn progression_to_bytes(chords: &[RenderedChord], tempo_bpm: u16) -> io::Result<Vec<u8>> {
    let smf = progression_to_smf(chords, tempo_bpm);
    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    Ok(buf)
}

fn progression_to_smf(chords: &[RenderedChord], tempo_bpm: u16) -> Smf<'static> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    // Track 0: tempo track
    let mut tempo_track: Track<'static> = Vec::new();
    let tempo_microseconds = 60_000_000 / u32::from(tempo_bpm.max(1));
    tempo_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(midly::MetaMessage::Tempo(u24::new(tempo_microseconds))),
    });
    tempo_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(midly::MetaMessage::EndOfTrack),
    });
    smf.tracks.push(tempo_track);

    let channel = u4::new(0);
    let mut track: Track<'static> = Vec::new();
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(midly::MetaMessage::TrackName(b"Chords")),
    });
    // Acoustic grand piano
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange { program: u7::new(0) },
        },
    });

    // Ticks since the last emitted event.
    let mut pending_delta: u32 = 0;
    for chord in chords {
        let mut notes = chord.notes.clone();
        notes.retain(|&n| n <= MAX_NOTE);
        notes.sort_unstable();
        notes.dedup();

        if notes.is_empty() {
            pending_delta += TICKS_PER_CHORD;
            continue;
        }

        for (i, &pitch) in notes.iter().enumerate() {
            let delta = if i == 0 { pending_delta } else { 0 };
            track.push(TrackEvent {
                delta: u28::new(delta),
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn {
                        key: u7::new(pitch),
                        vel: u7::new(VELOCITY),
                    },
                },
            });
        }
        for (i, &pitch) in notes.iter().enumerate() {
            let delta = if i == 0 { TICKS_PER_CHORD } else { 0 };
            track.push(TrackEvent {
                delta: u28::new(delta),
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOff {
                        key: u7::new(pitch),
                        vel: u7::new(0),
                    },
                },
            });
        }
        pending_delta = 0;
    }

    track.push(TrackEvent {
        delta: u28::new(pending_delta),
        kind: TrackEventKind::Meta(midly::MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    smf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chord(label: &str, notes: &[u8]) -> RenderedChord {
        RenderedChord {
            label: label.into(),
            notes: notes.to_vec(),
        }
    }

    fn note_events(smf: &Smf) -> Vec<(u32, bool, u8)> {
        let mut tick = 0;
        let mut out = Vec::new();
        for event in &smf.tracks[1] {
            tick += event.delta.as_int();
            if let TrackEventKind::Midi { message, .. } = event.kind {
                match message {
                    MidiMessage::NoteOn { key, .. } => out.push((tick, true, key.as_int())),
                    MidiMessage::NoteOff { key, .. } => out.push((tick, false, key.as_int())),
                    _ => {}
                }
            }
        }
        out
    }

    #[test]
    fn block_chords_last_one_bar() {
        let smf = progression_to_smf(
            &[chord("Cmaj", &[64, 60, 67]), chord("G7", &[55, 59])],
            120,
        );
        // 1 tempo track + 1 chord track
        assert_eq!(smf.tracks.len(), 2);
        assert_eq!(
            note_events(&smf),
            vec![
                (0, true, 60),
                (0, true, 64),
                (0, true, 67),
                (1920, false, 60),
                (1920, false, 64),
                (1920, false, 67),
                (1920, true, 55),
                (1920, true, 59),
                (3840, false, 55),
                (3840, false, 59),
            ]
        );
    }

    #[test]
    fn empty_chord_is_a_rest_and_bad_notes_are_dropped() {
        let smf = progression_to_smf(&[chord("N.C.", &[]), chord("Am", &[57, 57, 200])], 90);
        assert_eq!(note_events(&smf), vec![(1920, true, 57), (3840, false, 57)]);
    }

    #[test]
    fn tempo_is_written() {
        let smf = progression_to_smf(&[], 60);
        match smf.tracks[0][0].kind {
            TrackEventKind::Meta(midly::MetaMessage::Tempo(t)) => assert_eq!(t.as_int(), 1_000_000),
            ref other => panic!("expected tempo, got {other:?}"),
        }
    }

    #[test]
    fn written_file_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progression.mid");
        write_midi(&[chord("Am", &[57, 60, 64])], DEFAULT_TEMPO_BPM, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"MThd"));
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 2);
        assert_eq!(note_events(&smf).len(), 6);
    }

    #[test]
    fn rewrite_replaces_file_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progression.mid");
        write_midi(&[chord("Am", &[57, 60, 64])], DEFAULT_TEMPO_BPM, &path).unwrap();
        write_midi(
            &[chord("C", &[60, 64, 67]), chord("G", &[55, 59, 62])],
            DEFAULT_TEMPO_BPM,
            &path,
        )
        .unwrap();

        let smf_bytes = std::fs::read(&path).unwrap();
        let smf = Smf::parse(&smf_bytes).unwrap();
        assert_eq!(note_events(&smf).len(), 12);

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![OsString::from("progression.mid")]);
    }

    #[test]
    fn temp_file_sits_next_to_target() {
        let temp = temp_path(Path::new("static/chord_progression.mid")).unwrap();
        assert_eq!(temp, Path::new("static/.chord_progression.mid.tmp"));
        assert!(temp_path(Path::new("/")).is_err());
    }

    #[test]
    fn unwritable_path_is_an_artifact_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_dir").join("progression.mid");
        let err = write_midi(&[chord("Am", &[57])], DEFAULT_TEMPO_BPM, &path).unwrap_err();
        assert!(matches!(err, ModelError::ArtifactWriteFailure { .. }), "got {err:?}");
    }
}
