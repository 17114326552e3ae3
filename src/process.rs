//! Helpers for the external tools the pipeline drives.

use std::process::Command;

/// Start the tool in its own process group.
///
/// A terminal Ctrl-C is delivered to the whole foreground group. Capture and
/// transcode children must only stop when the agent tells them to, so they
/// are kept out of that group and the interrupt reaches the agent alone.
pub(crate) fn isolate_from_terminal(cmd: &mut Command) -> &mut Command {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd
}


#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::testing::{own_pgid, pgid_of};
    use super::*;
    use std::process::Stdio;

    #[test]
    fn isolated_child_leads_its_own_group() -> std::io::Result<()> {
        let mut cmd = Command::new("sleep");
        cmd.arg("5").stdin(Stdio::null());
        let mut child = isolate_from_terminal(&mut cmd).spawn()?;

        let pgid = pgid_of(child.id());
        let _ = child.kill();
        let _ = child.wait();

        assert_ne!(pgid, own_pgid());
        assert_eq!(pgid, libc::pid_t::try_from(child.id()).expect("pid fits"));
        Ok(())
    }
}
