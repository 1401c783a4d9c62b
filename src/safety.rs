//! Two-tier confirmation gate guarding the USB erase.
//!
//! The gate only runs later, on the Mac, as shell control flow. This module
//! holds both the state machine that flow must realize ([`GateState`]) and
//! the renderer that emits it ([`DiskSafetyPolicy::render`]).

/// Token an operator types to accept a disk that looks internal.
pub const FORCE_TOKEN: &str = "force";
/// Token an operator types to accept the erase itself.
pub const CONFIRM_TOKEN: &str = "yes";

// ── Location signal ───────────────────────────────────────────────────────────

/// What `diskutil info` reports about the target disk at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocationSignal {
    /// `Device Location:` mentions `External`.
    pub external_location: bool,
    /// `Protocol:` mentions `USB`.
    pub usb_protocol: bool,
}

impl LocationSignal {
    pub fn verdict(self) -> SafetyVerdict {
        if self.external_location || self.usb_protocol {
            SafetyVerdict::ExternalConfirmed
        } else {
            SafetyVerdict::InternalSuspected
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyVerdict {
    ExternalConfirmed,
    InternalSuspected,
}

// ── State machine ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Start,
    InternalSuspected,
    EraseConfirmationPending,
    /// Terminal: nothing is erased.
    Aborted,
    /// Terminal: the erase runs.
    Erasing,
}

impl GateState {
    /// Feeds the disk-location signal. Only meaningful from `Start`.
    pub fn observe(self, signal: LocationSignal) -> GateState {
        match self {
            GateState::Start => match signal.verdict() {
                SafetyVerdict::ExternalConfirmed => GateState::EraseConfirmationPending,
                SafetyVerdict::InternalSuspected => GateState::InternalSuspected,
            },
            GateState::Aborted | GateState::Erasing => self,
            GateState::InternalSuspected | GateState::EraseConfirmationPending => {
                GateState::Aborted
            }
        }
    }

    /// Feeds one operator reply. Replies are compared literally, untrimmed.
    pub fn reply(self, answer: &str) -> GateState {
        match self {
            GateState::InternalSuspected if answer == FORCE_TOKEN => {
                GateState::EraseConfirmationPending
            }
            GateState::EraseConfirmationPending if answer == CONFIRM_TOKEN => GateState::Erasing,
            GateState::Aborted | GateState::Erasing => self,
            _ => GateState::Aborted,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, GateState::Aborted | GateState::Erasing)
    }

    /// Runs the whole gate: one signal, then replies until a terminal state.
    /// Running out of replies aborts.
    pub fn run<'a>(signal: LocationSignal, replies: impl IntoIterator<Item = &'a str>) -> GateState {
        let mut state = GateState::Start.observe(signal);
        let mut replies = replies.into_iter();
        while !state.is_terminal() {
            state = match replies.next() {
                Some(answer) => state.reply(answer),
                None => GateState::Aborted,
            };
        }
        state
    }
}

// ── Shell rendering ───────────────────────────────────────────────────────────

/// Text fragments and control flow for the erase gate.
#[derive(Debug, Clone, Copy)]
pub struct DiskSafetyPolicy {
    /// Shell function called on abort; receives the exit status.
    pub abort_fn: &'static str,
}

impl Default for DiskSafetyPolicy {
    fn default() -> Self {
        Self {
            abort_fn: "pause_and_exit",
        }
    }
}

impl DiskSafetyPolicy {
    /// Banner shown when the disk does not look removable.
    pub fn internal_warning(disk_expr: &str) -> String {
        format!("WARNING: Disk {disk_expr} appears to be an INTERNAL or FIXED disk.")
    }

    pub fn erase_warning(disk_expr: &str) -> String {
        format!("This will ERASE ALL DATA on /dev/{disk_expr}.")
    }

    /// Emits the gate for the disk held in shell variable `disk_var`,
    /// followed by `erase` which only runs after the `yes` reply.
    pub fn render(&self, disk_var: &str, erase: &[String]) -> Vec<String> {
        let disk = format!("${disk_var}");
        let abort = format!("    {} 1", self.abort_fn);

        let mut out = vec![
            format!("DISK_INFO=\"$(diskutil info \"{disk}\" 2>/dev/null)\""),
            "if [ -z \"$DISK_INFO\" ]; then".to_string(),
            format!("  echo \"${{RED}}ERROR: diskutil knows no disk named {disk}.${{RESET}}\""),
            format!("  {} 1", self.abort_fn),
            "fi".to_string(),
            String::new(),
            "IS_EXTERNAL=0".to_string(),
            "if printf '%s\\n' \"$DISK_INFO\" | grep -Eq 'Device Location:.*External'; then".to_string(),
            "  IS_EXTERNAL=1".to_string(),
            "fi".to_string(),
            "if printf '%s\\n' \"$DISK_INFO\" | grep -Eq 'Protocol:.*USB'; then".to_string(),
            "  IS_EXTERNAL=1".to_string(),
            "fi".to_string(),
            String::new(),
            "if [ \"$IS_EXTERNAL\" != \"1\" ]; then".to_string(),
            "  echo \"\"".to_string(),
            "  echo \"${RED}################################################################${RESET}\"".to_string(),
            format!("  echo \"${{RED}}  {}${{RESET}}\"", Self::internal_warning(&disk)),
            "  echo \"${RED}  It is not reported as External and does not use the USB protocol.${RESET}\"".to_string(),
            "  echo \"${RED}  Erasing it could destroy macOS or your personal files.${RESET}\"".to_string(),
            "  echo \"${RED}################################################################${RESET}\"".to_string(),
            "  echo \"\"".to_string(),
            "  FORCE_REPLY=\"\"".to_string(),
            format!(
                "  IFS= read -r -p \"Type '{FORCE_TOKEN}' if you are SURE {disk} is your USB stick: \" FORCE_REPLY"
            ),
            format!("  if [ \"$FORCE_REPLY\" != \"{FORCE_TOKEN}\" ]; then"),
            "    echo \"Aborted. No changes were made.\"".to_string(),
            abort,
            "  fi".to_string(),
            "fi".to_string(),
            String::new(),
            format!("echo \"${{YELLOW}}{}${{RESET}}\"", Self::erase_warning(&disk)),
            "CONFIRM_REPLY=\"\"".to_string(),
            format!("IFS= read -r -p \"Type '{CONFIRM_TOKEN}' to continue: \" CONFIRM_REPLY"),
            format!("if [ \"$CONFIRM_REPLY\" != \"{CONFIRM_TOKEN}\" ]; then"),
            "  echo \"Aborted. No changes were made.\"".to_string(),
            format!("  {} 1", self.abort_fn),
            "fi".to_string(),
            String::new(),
        ];
        out.extend(erase.iter().cloned());
        out
    }
}
