use crate::cmd::{cmd, Cmd, ToArgs};

/// A batch of commands written to the server in one go.
///
/// Replies are read back in the order the commands were added. The
/// connection decides how many replies to read, based on its reply mode.
///
/// ```rust
/// let mut pipe = respool::pipe();
/// pipe.cmd("AUTH").arg("secret").cmd("READONLY");
/// assert_eq!(pipe.len(), 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    commands: Vec<Cmd>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Pipeline {
        Pipeline::default()
    }

    /// Creates an empty pipeline with room for `capacity` commands.
    pub fn with_capacity(capacity: usize) -> Pipeline {
        Pipeline {
            commands: Vec::with_capacity(capacity),
        }
    }

    /// Adds a command to the pipeline.
    #[inline]
    pub fn add_command(&mut self, cmd: Cmd) -> &mut Self {
        self.commands.push(cmd);
        self
    }

    /// Starts a new command. Functions such as `arg` then become
    /// available to add more arguments to that command.
    #[inline]
    pub fn cmd(&mut self, name: &str) -> &mut Self {
        self.add_command(cmd(name))
    }

    /// Adds an argument to the last started command.
    ///
    /// # Panics
    ///
    /// Panics if no command was started yet.
    #[inline]
    pub fn arg<T: ToArgs>(&mut self, arg: T) -> &mut Self {
        match self.commands.last_mut() {
            Some(cmd) => {
                cmd.arg(arg);
            }
            None => panic!("No command on stack"),
        }
        self
    }

    /// Returns an iterator over all the commands currently in this pipeline
    pub fn cmd_iter(&self) -> impl Iterator<Item = &Cmd> {
        self.commands.iter()
    }

    /// Returns the number of commands in the pipeline.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if the pipeline holds no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

pub(crate) fn encode_pipeline<'a>(cmds: impl Iterator<Item = &'a Cmd>) -> Vec<u8> {
    let mut rv = vec![];
    for cmd in cmds {
        cmd.write_packed_command(&mut rv);
    }
    rv
}

/// Shortcut for creating a new pipeline.
pub fn pipe() -> Pipeline {
    Pipeline::new()
}
