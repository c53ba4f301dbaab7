use anyhow::{Context, Result, bail};
use alsa::mixer::{Mixer, Selem, SelemChannelId, SelemId};
use alsa::poll::Descriptors;
use std::sync::Mutex;
use tracing::info;

use crate::system::MixerInterface;

/// One ALSA simple mixer element (e.g. `PCM`, `Master`, `IEC958`) on a
/// card, exposed through [`MixerInterface`].
///
/// The underlying `snd_mixer_t` handle is not thread-safe, so it sits
/// behind a mutex; the poll thread and the hotkey thread only hold the
/// lock for the duration of a single query or mutation, never across the
/// blocking wait.
pub struct AlsaMixer {
    card: String,
    control: String,
    inner: Mutex<Mixer>,
}

impl AlsaMixer {
    /// Open `control` on `card`. Fails if the card cannot be opened or the
    /// named control does not exist - both are fatal startup errors for
    /// the daemon.
    pub fn open(card: &str, control: &str) -> Result<Self> {
        let mixer = Mixer::new(card, false)
            .with_context(|| format!("failed to open mixer on card '{card}'"))?;

        let id = SelemId::new(control, 0);
        if mixer.find_selem(&id).is_none() {
            bail!("mixer control '{control}' not found on card '{card}'");
        }

        info!("opened mixer control '{}' on card '{}'", control, card);

        Ok(Self {
            card: card.to_string(),
            control: control.to_string(),
            inner: Mutex::new(mixer),
        })
    }

    pub fn card(&self) -> &str {
        &self.card
    }

    pub fn control(&self) -> &str {
        &self.control
    }

    fn with_selem<T>(&self, f: impl FnOnce(&Selem) -> Result<T>) -> Result<T> {
        let mixer = self.inner.lock().unwrap();
        let id = SelemId::new(&self.control, 0);
        let selem = mixer.find_selem(&id).with_context(|| {
            format!(
                "mixer control '{}' disappeared from card '{}'",
                self.control, self.card
            )
        })?;
        f(&selem)
    }
}

impl MixerInterface for AlsaMixer {
    fn volume(&self) -> Result<i64> {
        self.with_selem(|selem| {
            let (min, max) = selem.get_playback_volume_range();
            if max <= min {
                return Ok(0);
            }
            let raw = selem.get_playback_volume(SelemChannelId::FrontLeft)?;
            Ok(((raw - min) * 100 + (max - min) / 2) / (max - min))
        })
    }

    fn is_muted(&self) -> Result<bool> {
        self.with_selem(|selem| {
            if !selem.has_playback_switch() {
                return Ok(false);
            }
            Ok(selem.get_playback_switch(SelemChannelId::FrontLeft)? == 0)
        })
    }

    fn set_volume(&self, percent: i64) -> Result<()> {
        let percent = percent.clamp(0, 100);
        self.with_selem(|selem| {
            let (min, max) = selem.get_playback_volume_range();
            if max <= min {
                return Ok(());
            }
            let raw = min + (percent * (max - min) + 50) / 100;
            selem.set_playback_volume_all(raw)?;
            Ok(())
        })
    }

    fn set_mute(&self, mute: bool) -> Result<()> {
        self.with_selem(|selem| {
            selem.set_playback_switch_all(if mute { 0 } else { 1 })?;
            Ok(())
        })
    }

    fn wait_descriptors(&self) -> Result<Vec<libc::pollfd>> {
        let mixer = self.inner.lock().unwrap();
        let count = Descriptors::count(&*mixer);
        let mut fds = vec![
            libc::pollfd {
                fd: -1,
                events: 0,
                revents: 0,
            };
            count
        ];
        let filled = Descriptors::fill(&*mixer, &mut fds)
            .with_context(|| format!("failed to fill poll descriptors for '{}'", self.control))?;
        fds.truncate(filled);
        Ok(fds)
    }

    fn drain_events(&self) -> Result<()> {
        let mixer = self.inner.lock().unwrap();
        mixer
            .handle_events()
            .with_context(|| format!("failed to acknowledge mixer events for '{}'", self.control))?;
        Ok(())
    }
}
