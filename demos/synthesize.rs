//! Synthesize one sentence from a local model directory to a WAV file.
//!
//! Usage:
//!   cargo run --features onnx,espeak --example synthesize -- --model ./kokoro-en --type kokoro
//!   cargo run --features onnx --example synthesize -- --model ./vits-ljs --type vits \
//!       --speaker 0 --text "Hello from Rust!" --output hello.wav
//!
//! Set `RUST_LOG=debug` to see per-chunk progress from the library.

use std::path::Path;

use runanywhere_native::{logging, SynthesisConfig, Synthesizer};

fn main() -> anyhow::Result<()> {
    // ── Parse simple CLI arguments ───────────────────────────────────────────
    let mut args = std::env::args().skip(1).peekable();

    let mut model_dir  = "models/kitten".to_string();
    let mut model_type = "kitten".to_string();
    let mut text       = "This high quality TTS model works without a GPU.".to_string();
    let mut output     = "output.wav".to_string();
    let mut speaker    = 0i64;
    let mut speed      = 1.0f32;
    let mut threads    = 2i64;
    let mut max_len    = 200i64;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--model"   => { if let Some(v) = args.next() { model_dir  = v; } }
            "--type"    => { if let Some(v) = args.next() { model_type = v; } }
            "--text"    => { if let Some(v) = args.next() { text       = v; } }
            "--output"  => { if let Some(v) = args.next() { output     = v; } }
            "--speaker" => { if let Some(v) = args.next() { speaker    = v.parse().unwrap_or(0); } }
            "--speed"   => { if let Some(v) = args.next() { speed      = v.parse().unwrap_or(1.0); } }
            "--threads" => { if let Some(v) = args.next() { threads    = v.parse().unwrap_or(2); } }
            "--max-len" => { if let Some(v) = args.next() { max_len    = v.parse().unwrap_or(200); } }
            "--help"    => {
                println!(
                    "Usage: synthesize [--model DIR] [--type kitten|vits|kokoro|matcha] \
                     [--text TEXT] [--output FILE] [--speaker ID] [--speed FLOAT] \
                     [--threads N] [--max-len CHARS]"
                );
                return Ok(());
            }
            _ => {}
        }
    }

    logging::init();

    println!("Model   : {} ({})", model_dir, model_type);
    println!("Text    : {:?}", text);
    println!("Speaker : {}", speaker);
    println!("Speed   : {}", speed);
    println!("Output  : {}", output);
    println!();

    // ── Load model ───────────────────────────────────────────────────────────
    let config = SynthesisConfig::parse(&model_dir, &model_type, threads, max_len)?;
    let tts = Synthesizer::initialize(config)?;

    let speakers = tts.num_speakers()?;
    let names: Vec<String> = (0..speakers as i64)
        .map(|id| tts.speaker_name(id).unwrap_or_else(|| format!("#{id}")))
        .collect();
    println!("Sample rate : {} Hz", tts.sample_rate()?);
    println!("Speakers    : {:?}", names);

    // ── Generate audio ───────────────────────────────────────────────────────
    println!("\nSynthesising speech…");
    let audio = tts.synthesize_with_progress(&text, speaker, speed, |p| {
        println!("  {:>3.0}%", p * 100.0);
    })?;
    audio.write_wav(Path::new(&output))?;
    tts.destroy();

    println!("Done! {:.2}s of audio", audio.duration_secs());
    Ok(())
}
