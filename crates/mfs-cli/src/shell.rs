//! The `mfs>` command loop and command dispatch.

use std::io::{BufRead, Write};

use mfs_config::{log_image_info, log_image_warn, log_shell_debug};
use mfs_core::{MockFs, Undelete};

use crate::command::{Command, ShellError};
use crate::output::write_listing;

/// Whether the loop keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// How the loop presents itself.
#[derive(Debug, Clone, Default)]
pub struct ShellOptions {
    /// Printed before each line is read; `None` for scripts.
    pub prompt: Option<String>,
    /// Print each line back after the prompt text.
    pub echo: bool,
    /// Save the bound image when the loop ends.
    pub autosave_on_quit: bool,
}

pub struct Shell {
    fs: MockFs,
    options: ShellOptions,
}

impl Shell {
    pub fn new(fs: MockFs, options: ShellOptions) -> Self {
        Self { fs, options }
    }

    pub fn fs_mut(&mut self) -> &mut MockFs {
        &mut self.fs
    }

    /// Read and run lines until `quit` or end of input.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<(), ShellError> {
        let mut lines = input.lines();
        loop {
            if let Some(prompt) = &self.options.prompt {
                write!(out, "{}", prompt)?;
                out.flush()?;
            }
            let Some(line) = lines.next() else {
                if self.options.prompt.is_some() {
                    writeln!(out)?;
                }
                break;
            };
            let line = line?;
            if self.options.echo {
                writeln!(out, "{}", line)?;
            }
            if self.run_line(&line, out)? == Flow::Quit {
                break;
            }
        }
        self.finish(out)
    }

    /// Run one line, printing any command error. Only output failures are
    /// returned.
    pub fn run_line<W: Write>(&mut self, line: &str, out: &mut W) -> Result<Flow, ShellError> {
        let result = Command::parse_line(line).and_then(|command| match command {
            Some(command) => self.execute(command, out),
            None => Ok(Flow::Continue),
        });
        match result {
            Ok(flow) => Ok(flow),
            Err(ShellError::Output(e)) => Err(ShellError::Output(e)),
            Err(e) => {
                log_shell_debug!("Command failed", error = e.to_string());
                writeln!(out, "ERROR: {}", e)?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Dispatch one parsed command to the engine and print its result.
    pub fn execute<W: Write>(&mut self, command: Command, out: &mut W) -> Result<Flow, ShellError> {
        if command.needs_image() && !self.fs.is_open() {
            writeln!(out, "ERROR: Disk image is not opened.")?;
            return Ok(Flow::Continue);
        }
        log_shell_debug!("Dispatching command", command = format!("{:?}", command));

        match command {
            Command::CreateFs(path) => self.fs.create(&path)?,
            Command::Open(path) => self.fs.open(&path)?,
            Command::SaveFs => self.fs.save()?,
            Command::Close => self.fs.close()?,
            Command::Insert(path) => {
                self.fs.image_mut()?.insert(&path)?;
            }
            Command::Retrieve { name, dest } => {
                let (written, bytes) = self.fs.image()?.retrieve(&name, dest.as_deref())?;
                writeln!(out, "File found.")?;
                writeln!(out, "Writing {} bytes to {}", bytes, written.display())?;
            }
            Command::Read {
                name,
                start,
                length,
            } => {
                let hex = self.fs.image()?.read_range(&name, start, length)?;
                writeln!(
                    out,
                    "File {} (in hexadec), from byte {} for {} bytes::",
                    name, start, length
                )?;
                writeln!(out, "{}", hex)?;
                writeln!(out, "----File Reading finished----")?;
            }
            Command::Delete(name) => self.fs.image_mut()?.delete(&name)?,
            Command::Undelete(name) => match self.fs.image_mut()?.undelete(&name)? {
                Undelete::Recovered => writeln!(out, "\"{}\" recovered", name)?,
                Undelete::AlreadyPresent => writeln!(out, "File {} exists", name)?,
            },
            Command::List(options) => {
                let rows = self.fs.image()?.list(options)?;
                write_listing(out, &rows, options)?;
            }
            Command::Df => writeln!(out, "{} bytes free.", self.fs.available()?)?,
            Command::Attrib { change, name } => {
                self.fs
                    .image_mut()?
                    .set_attribute(&name, change.attribute, change.enable)?;
            }
            Command::Xor {
                direction,
                name,
                key,
            } => {
                self.fs.image_mut()?.xor_transform(&name, key)?;
                writeln!(out, "{} complete.", direction.label())?;
            }
            Command::Fsck => {
                let problems = self.fs.image()?.check();
                if problems.is_empty() {
                    writeln!(out, "Image is consistent.")?;
                } else {
                    for problem in &problems {
                        writeln!(out, "  {}", problem)?;
                    }
                    writeln!(out, "{} problems found.", problems.len())?;
                }
            }
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// End of session: save the bound image if configured to.
    fn finish<W: Write>(&mut self, out: &mut W) -> Result<(), ShellError> {
        if !self.options.autosave_on_quit || !self.fs.is_open() {
            return Ok(());
        }
        match self.fs.save() {
            Ok(()) => {
                log_image_info!("Saved image on exit");
                Ok(())
            }
            Err(e) => {
                log_image_warn!("Autosave failed", error = e.to_string());
                writeln!(out, "ERROR: {}", e)?;
                Ok(())
            }
        }
    }
}

impl From<MockFs> for Shell {
    fn from(fs: MockFs) -> Self {
        Shell::new(fs, ShellOptions::default())
    }
}
