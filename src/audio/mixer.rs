// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
// Core mixing logic that's independent of the cpal stream so it can be tested directly.
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;

/// Shared controls for a voice. The playing instance writes them, the mixer reads them.
pub struct VoiceControl {
    /// True while the voice is audible. Cleared by the mixer once the voice runs out.
    playing: AtomicBool,
    /// Set when the voice should be cut off.
    stopped: AtomicBool,
    /// Linear gain stored as f32 bits.
    gain: AtomicU32,
}

impl VoiceControl {
    pub fn new(gain: f32) -> VoiceControl {
        VoiceControl {
            playing: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            gain: AtomicU32::new(gain.to_bits()),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn mark_playing(&self) {
        self.playing.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.playing.store(false, Ordering::Release);
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
    }

    fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    fn finish(&self) {
        self.playing.store(false, Ordering::Release);
    }
}

/// An audible copy of a buffer inside the mixer.
pub struct Voice {
    data: Arc<Vec<f32>>,
    channel_count: usize,
    frame: usize,
    control: Arc<VoiceControl>,
}

impl Voice {
    pub fn new(data: Arc<Vec<f32>>, channel_count: u16, control: Arc<VoiceControl>) -> Voice {
        Voice {
            data,
            channel_count: channel_count.max(1) as usize,
            frame: 0,
            control,
        }
    }

    /// Adds this voice into the output. Returns false once the voice is done.
    fn mix_into(&mut self, output: &mut [f32], output_channels: usize) -> bool {
        if self.control.stopped.load(Ordering::Acquire) {
            return false;
        }

        let gain = self.control.gain();
        let total_frames = self.data.len() / self.channel_count;
        let frames = output.len() / output_channels;

        for out_frame in output.chunks_exact_mut(output_channels).take(frames) {
            if self.frame >= total_frames {
                break;
            }
            let base = self.frame * self.channel_count;
            for (channel, sample) in out_frame.iter_mut().enumerate() {
                *sample += self.data[base + channel % self.channel_count] * gain;
            }
            self.frame += 1;
        }

        if self.frame >= total_frames {
            self.control.finish();
            return false;
        }
        true
    }
}

/// Mixes all live voices into interleaved output blocks.
pub struct Mixer {
    voices: Vec<Voice>,
    voice_rx: Receiver<Voice>,
    output_channels: usize,
}

impl Mixer {
    pub fn new(voice_rx: Receiver<Voice>, output_channels: u16) -> Mixer {
        Mixer {
            voices: Vec::new(),
            voice_rx,
            output_channels: output_channels.max(1) as usize,
        }
    }

    /// Fills the output with the next block of mixed audio.
    pub fn process(&mut self, output: &mut [f32]) {
        while let Ok(voice) = self.voice_rx.try_recv() {
            self.voices.push(voice);
        }

        output.fill(0.0);
        let output_channels = self.output_channels;
        self.voices
            .retain_mut(|voice| voice.mix_into(output, output_channels));

        for sample in output.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }
}
