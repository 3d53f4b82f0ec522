use nix::sys::signal::{self, SigHandler, Signal};
use tracing::debug;

/// Interrupt handling of the launcher and its children.
///
/// The launcher ignores SIGINT so an interactive interrupt reaches the
/// running stages and not the process waiting on them. Each child puts the
/// default disposition back before exec. Holding a `SignalPolicy` means the
/// launcher side has been installed.
#[derive(Debug)]
pub struct SignalPolicy(());

impl SignalPolicy {
	pub fn install() -> nix::Result<SignalPolicy> {
		unsafe { signal::signal(Signal::SIGINT, SigHandler::SigIgn) }?;
		debug!("SIGINT ignored in launcher");
		Ok(SignalPolicy(()))
	}

	/// Restores default dispositions in a forked child.
	///
	/// SIGPIPE is reset too: the Rust runtime ignores it in the launcher and
	/// an ignored disposition survives exec, which would turn a closed
	/// downstream reader into EPIPE errors instead of a quiet exit.
	pub fn reset_in_child(&self) -> nix::Result<()> {
		unsafe {
			signal::signal(Signal::SIGINT, SigHandler::SigDfl)?;
			signal::signal(Signal::SIGPIPE, SigHandler::SigDfl)?;
		}
		Ok(())
	}
}
