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
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{error, info, span, warn, Level};

use super::decode::decode_file;
use super::mixer::{Mixer, Voice, VoiceControl};
use super::{Buffer, DecodeError, Instance, InstanceStatus, OutputError};
use crate::shutdown::Shutdown;

/// How often the output thread checks whether it should tear the stream down.
const OUTPUT_THREAD_POLL: Duration = Duration::from_millis(100);

/// A cpal output device with a continuously running stream that mixes key sounds.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The stream's sample rate. Decoded buffers are resampled to it.
    sample_rate: u32,
    /// The stream's channel count.
    channels: u16,
    /// Hands new voices to the mixer running in the stream callback.
    voice_tx: Sender<Voice>,
    /// Tells the output thread to drop the stream.
    shutdown: Shutdown,
    /// Keeps the stream alive; cpal streams can't move between threads.
    output_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, Rate={})",
            self.name, self.channels, self.sample_rate
        )
    }
}

impl Device {
    /// Lists the names of all output devices on the default host.
    pub fn list() -> Result<Vec<String>, OutputError> {
        let host = cpal::default_host();
        let mut names = Vec::new();
        for device in host.output_devices()? {
            match device.name() {
                Ok(name) => names.push(name),
                Err(e) => warn!(err = %e, "Unable to read output device name"),
            }
        }
        names.sort();
        Ok(names)
    }

    /// Opens the named device ("default" picks the host default) and starts its output stream.
    pub fn get(name: &str) -> Result<Device, OutputError> {
        let host = cpal::default_host();
        let device = if name == "default" {
            host.default_output_device()
        } else {
            let mut found = None;
            for device in host.output_devices()? {
                if device.name()?.trim() == name {
                    found = Some(device);
                    break;
                }
            }
            found
        }
        .ok_or_else(|| OutputError::NotFound(name.to_string()))?;

        let device_name = device.name()?;
        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.config();
        let sample_rate = config.sample_rate;
        let channels = config.channels;

        let (voice_tx, voice_rx) = crossbeam_channel::unbounded::<Voice>();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), OutputError>>(1);
        let shutdown = Shutdown::new();

        let output_thread = {
            let shutdown = shutdown.clone();
            let device_name = device_name.clone();
            thread::Builder::new()
                .name("keyclack-output".to_string())
                .spawn(move || {
                    let span = span!(Level::INFO, "cpal output", device = %device_name);
                    let _enter = span.enter();

                    let mixer = Mixer::new(voice_rx, channels);
                    let stream = match sample_format {
                        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer),
                        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer),
                        cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, mixer),
                        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer),
                        other => Err(OutputError::UnsupportedFormat(format!("{:?}", other))),
                    };

                    let stream = match stream {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    if let Err(e) = stream.play() {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                    info!(sample_rate, channels, "Output stream started");
                    let _ = ready_tx.send(Ok(()));

                    while !shutdown.wait_timeout(OUTPUT_THREAD_POLL) {}
                    drop(stream);
                    info!("Output stream stopped");
                })
                .map_err(|_| OutputError::ThreadExited)?
        };

        ready_rx.recv().map_err(|_| OutputError::ThreadExited)??;

        Ok(Device {
            name: device_name,
            sample_rate,
            channels,
            voice_tx,
            shutdown,
            output_thread: Mutex::new(Some(output_thread)),
        })
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.shutdown.request();
        if let Some(thread) = self.output_thread.lock().take() {
            let _ = thread.join();
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
) -> Result<cpal::Stream, OutputError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    Ok(device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            mixer.process(&mut scratch);
            for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(*src);
            }
        },
        |err| error!("CPAL output stream error: {}", err),
        None,
    )?)
}

impl super::Backend for Device {
    fn decode(&self, path: &Path) -> Result<Buffer, DecodeError> {
        decode_file(path, Some(self.sample_rate))
    }

    fn instantiate(&self, buffer: &Buffer) -> Box<dyn Instance> {
        Box::new(CpalInstance {
            buffer: buffer.clone(),
            control: Arc::new(VoiceControl::new(1.0)),
            voice_tx: self.voice_tx.clone(),
            started: false,
        })
    }
}

/// A key sound queued into the cpal mixer.
struct CpalInstance {
    buffer: Buffer,
    control: Arc<VoiceControl>,
    voice_tx: Sender<Voice>,
    started: bool,
}

impl Instance for CpalInstance {
    fn play(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.control.mark_playing();

        let voice = Voice::new(
            self.buffer.data().clone(),
            self.buffer.channel_count(),
            self.control.clone(),
        );
        if let Err(e) = self.voice_tx.send(voice) {
            error!(error = %e, "Failed to send voice to mixer");
            self.control.stop();
        }
    }

    fn stop(&mut self) {
        self.control.stop();
    }

    fn set_volume(&mut self, volume: u8) {
        self.control.set_gain(volume.min(100) as f32 / 100.0);
    }

    fn status(&self) -> InstanceStatus {
        if self.control.is_playing() {
            InstanceStatus::Playing
        } else {
            InstanceStatus::Stopped
        }
    }
}
