//! DTE side of the modem link: port mode tracking, sync, readiness, dial.
//!
//! ```text
//!            sync()              dial_up()
//!  Unknown ─────────▶ Command ─────────────▶ Data
//!     ▲                 ▲  ◀── enter_command_mode() (+++)
//!     │                 │  ──▶ resume_data_mode() (ATO)
//!     │ link_lost()     └──── hang_up() (+++, ATH)
//! ```
//!
//! Every retried step gives up early once the link-connected flag drops.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};

use heapless::String;

use crate::channel::AtChannel;
use crate::commands::{self, DialOutcome, PinState, RegistrationStatus, SignalQuality};
use crate::config::{Readiness, RetryPolicy};
use crate::error::AtError;
use crate::retry::retry;

/// Which protocol the modem port currently speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortMode {
    /// Not synchronised yet, or the link was lost.
    Unknown,
    /// AT commands.
    Command,
    /// PPP data.
    Data,
}

/// Result of a successful [`Dte::check_readiness`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReadinessReport {
    /// Last signal quality reading.
    pub signal: SignalQuality,
    /// Last registration reading.
    pub registration: RegistrationStatus,
}

/// Modem management on top of an AT channel.
pub struct Dte<'a, C: AtChannel> {
    at: &'a C,
    link_up: &'a AtomicBool,
    retry: RetryPolicy,
    mode: PortMode,
    session: bool,
}

impl<'a, C: AtChannel> Dte<'a, C> {
    /// `link_up` is owned by the transport driver, which clears it when the
    /// device disappears.
    pub fn new(at: &'a C, link_up: &'a AtomicBool, retry: RetryPolicy) -> Self {
        Self {
            at,
            link_up,
            retry,
            mode: PortMode::Unknown,
            session: false,
        }
    }

    /// Current port mode.
    pub fn mode(&self) -> PortMode {
        self.mode
    }

    /// Whether a data session has been dialled and not hung up.
    pub fn session_active(&self) -> bool {
        self.session
    }

    /// Whether the transport reports the device as present.
    pub fn is_link_up(&self) -> bool {
        self.link_up.load(Ordering::Acquire)
    }

    /// Forget all modem state after the transport went away.
    pub fn link_lost(&mut self) {
        log_info!("modem link lost");
        self.mode = PortMode::Unknown;
        self.session = false;
    }

    async fn retried<F, Fut>(&self, op: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: core::future::Future<Output = bool>,
    {
        let link_up = self.link_up;
        retry(&self.retry, || !link_up.load(Ordering::Acquire), op).await
    }

    /// Bring the port into command mode from an unknown state.
    ///
    /// Tries `AT`; if the modem does not answer it is assumed to be in data
    /// mode and `+++`, `AT`, `ATH` are tried in turn.
    pub async fn sync(&mut self) -> Result<(), AtError> {
        if self.mode != PortMode::Unknown {
            log_warn!("sync: port mode already known");
            return Err(AtError::InvalidState);
        }
        let at = self.at;

        if self.retried(move || async move { commands::at(at).await.is_ok() }).await {
            self.mode = PortMode::Command;
            return Ok(());
        }
        log_warn!("failed to sync with modem, trying to exit data mode");

        // The escape may be answered or not, depending on where the modem was.
        let _ = self
            .retried(move || async move { commands::exit_data_mode(at).await.is_ok() })
            .await;
        let alive = self.retried(move || async move { commands::at(at).await.is_ok() }).await;
        let hung_up = alive
            && self
                .retried(move || async move { commands::hang_up(at).await.is_ok() })
                .await;
        if !hung_up {
            log_error!("failed to sync with modem");
            return Err(AtError::CommandFailed);
        }
        self.mode = PortMode::Command;
        self.session = false;
        Ok(())
    }

    /// Check SIM, signal and registration before dialling.
    ///
    /// Each check is retried on its own. The PDP context list is read and
    /// logged between the signal and registration checks.
    pub async fn check_readiness(&self, readiness: &Readiness) -> Result<ReadinessReport, AtError> {
        if self.mode == PortMode::Data {
            return Err(AtError::InvalidState);
        }
        let at = self.at;
        let link_up = self.link_up;
        let abort = || !link_up.load(Ordering::Acquire);

        log_info!("checking SIM card state");
        let sim_ready = retry(&readiness.retry, abort, move || async move {
            matches!(commands::read_pin(at).await, Ok(PinState::Ready))
        })
        .await;
        if !sim_ready {
            log_error!("SIM card not ready");
            return Err(AtError::CommandFailed);
        }

        log_info!("checking signal quality");
        let signal = Cell::new(None);
        let last = &signal;
        let threshold = readiness.rssi_threshold;
        let signal_ok = retry(&readiness.retry, abort, move || async move {
            let Ok(q) = commands::signal_quality(at).await else {
                return false;
            };
            last.set(Some(q));
            q.rssi > threshold && q.rssi < 99 && q.ber <= 99
        })
        .await;
        let Some(signal) = signal.get().filter(|_| signal_ok) else {
            log_error!("signal quality not ready");
            return Err(AtError::CommandFailed);
        };
        log_info!("signal quality: rssi={}, ber={}", signal.rssi, signal.ber);

        match commands::pdp_context::<_, 128>(at).await {
            Ok(pdp) => log_info!("PDP context: {}", pdp.as_str()),
            Err(_) => log_warn!("could not read PDP context"),
        }

        log_info!("checking network registration");
        let registration = Cell::new(None);
        let last = &registration;
        let registered = retry(&readiness.retry, abort, move || async move {
            let Ok(status) = commands::network_registration(at).await else {
                return false;
            };
            last.set(Some(status));
            status.is_registered()
        })
        .await;
        let Some(registration) = registration.get().filter(|_| registered) else {
            log_error!("network registration not ready");
            return Err(AtError::CommandFailed);
        };

        Ok(ReadinessReport {
            signal,
            registration,
        })
    }

    /// Dial the packet data service and switch to data mode.
    pub async fn dial_up(&mut self) -> Result<(), AtError> {
        if self.session || self.mode == PortMode::Data {
            log_warn!("already in data mode, can't dial up");
            return Err(AtError::InvalidState);
        }
        match commands::dial(self.at).await? {
            DialOutcome::Connected => {
                log_info!("dial up connected");
                self.session = true;
                self.mode = PortMode::Data;
                Ok(())
            }
            _ => {
                log_error!("dial up failed");
                Err(AtError::CommandFailed)
            }
        }
    }

    /// Leave data mode without ending the session (`+++`).
    pub async fn enter_command_mode(&mut self) -> Result<(), AtError> {
        if !self.session || self.mode != PortMode::Data {
            return Err(AtError::InvalidState);
        }
        commands::exit_data_mode(self.at).await?;
        self.mode = PortMode::Command;
        Ok(())
    }

    /// Return to the established data session (`ATO`).
    pub async fn resume_data_mode(&mut self) -> Result<(), AtError> {
        if !self.session || self.mode != PortMode::Command {
            return Err(AtError::InvalidState);
        }
        match commands::resume_data_mode(self.at).await? {
            DialOutcome::Connected => {
                self.mode = PortMode::Data;
                Ok(())
            }
            _ => Err(AtError::CommandFailed),
        }
    }

    /// End the data session and stay in command mode.
    pub async fn hang_up(&mut self) -> Result<(), AtError> {
        if !self.session {
            log_warn!("not in data mode, can't hang up");
            return Err(AtError::InvalidState);
        }
        if self.mode == PortMode::Data {
            self.enter_command_mode().await?;
        }
        commands::hang_up(self.at).await?;
        self.session = false;
        self.mode = PortMode::Command;
        Ok(())
    }

    /// Read the identification strings (manufacturer, model, revision).
    pub async fn identify<const N: usize>(&self) -> Result<[String<N>; 3], AtError> {
        Ok([
            commands::manufacturer_id(self.at).await?,
            commands::module_id(self.at).await?,
            commands::revision_id(self.at).await?,
        ])
    }
}
