use std::{fmt, io};

/// Abstraction for something that accepts command arguments.
pub trait ArgWrite {
    /// Accepts a serialized argument.
    fn write_arg(&mut self, arg: &[u8]);
}

impl ArgWrite for Vec<Vec<u8>> {
    fn write_arg(&mut self, arg: &[u8]) {
        self.push(arg.to_owned());
    }
}

/// Used to convert a value into one or multiple command arguments.
pub trait ToArgs {
    /// Writes the value as one or more arguments.
    fn write_args<W>(&self, out: &mut W)
    where
        W: ?Sized + ArgWrite;
}

macro_rules! itoa_based_to_args_impl {
    ($t:ty) => {
        impl ToArgs for $t {
            fn write_args<W>(&self, out: &mut W)
            where
                W: ?Sized + ArgWrite,
            {
                let mut buf = ::itoa::Buffer::new();
                let s = buf.format(*self);
                out.write_arg(s.as_bytes())
            }
        }
    };
}

itoa_based_to_args_impl!(i32);
itoa_based_to_args_impl!(i64);
itoa_based_to_args_impl!(u16);
itoa_based_to_args_impl!(u32);
itoa_based_to_args_impl!(u64);
itoa_based_to_args_impl!(usize);

impl ToArgs for str {
    fn write_args<W>(&self, out: &mut W)
    where
        W: ?Sized + ArgWrite,
    {
        out.write_arg(self.as_bytes())
    }
}

impl ToArgs for String {
    fn write_args<W>(&self, out: &mut W)
    where
        W: ?Sized + ArgWrite,
    {
        out.write_arg(self.as_bytes())
    }
}

impl ToArgs for [u8] {
    fn write_args<W>(&self, out: &mut W)
    where
        W: ?Sized + ArgWrite,
    {
        out.write_arg(self)
    }
}

impl ToArgs for Vec<u8> {
    fn write_args<W>(&self, out: &mut W)
    where
        W: ?Sized + ArgWrite,
    {
        out.write_arg(self)
    }
}

impl<const N: usize> ToArgs for [u8; N] {
    fn write_args<W>(&self, out: &mut W)
    where
        W: ?Sized + ArgWrite,
    {
        out.write_arg(self)
    }
}

impl<T: ToArgs + ?Sized> ToArgs for &T {
    fn write_args<W>(&self, out: &mut W)
    where
        W: ?Sized + ArgWrite,
    {
        (**self).write_args(out)
    }
}

impl<T: ToArgs> ToArgs for Option<T> {
    fn write_args<W>(&self, out: &mut W)
    where
        W: ?Sized + ArgWrite,
    {
        if let Some(ref x) = *self {
            x.write_args(out);
        }
    }
}

/// Represents a command.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Cmd {
    data: Vec<u8>,
    // offsets that mark the end of each argument
    args: Vec<usize>,
}

impl ArgWrite for Cmd {
    fn write_arg(&mut self, arg: &[u8]) {
        self.data.extend_from_slice(arg);
        self.args.push(self.data.len());
    }
}

fn countdigits(mut v: usize) -> usize {
    let mut result = 1;
    loop {
        if v < 10 {
            return result;
        }
        if v < 100 {
            return result + 1;
        }
        if v < 1000 {
            return result + 2;
        }
        if v < 10000 {
            return result + 3;
        }

        v /= 10000;
        result += 4;
    }
}

#[inline]
fn bulklen(len: usize) -> usize {
    1 + countdigits(len) + 2 + len + 2
}

fn write_command<'a, I>(cmd: &mut (impl ?Sized + io::Write), args: I) -> io::Result<()>
where
    I: IntoIterator<Item = &'a [u8]> + ExactSizeIterator,
{
    let mut buf = ::itoa::Buffer::new();

    cmd.write_all(b"*")?;
    let s = buf.format(args.len());
    cmd.write_all(s.as_bytes())?;
    cmd.write_all(b"\r\n")?;

    for bytes in args {
        cmd.write_all(b"$")?;
        let s = buf.format(bytes.len());
        cmd.write_all(s.as_bytes())?;
        cmd.write_all(b"\r\n")?;

        cmd.write_all(bytes)?;
        cmd.write_all(b"\r\n")?;
    }
    Ok(())
}

impl Cmd {
    /// Creates a new empty command.
    pub fn new() -> Cmd {
        Cmd::default()
    }

    /// Appends an argument to the command.
    ///
    /// ```rust
    /// respool::cmd("CLIENT").arg("SETNAME").arg("svc-1");
    /// respool::cmd("SELECT").arg(3);
    /// ```
    #[inline]
    pub fn arg<T: ToArgs>(&mut self, arg: T) -> &mut Cmd {
        arg.write_args(self);
        self
    }

    /// Returns an iterator over the arguments in this command, the command
    /// name included.
    pub fn args_iter(&self) -> impl ExactSizeIterator<Item = &[u8]> + Clone + '_ {
        let mut prev = 0;
        self.args.iter().map(move |&end| {
            let arg = &self.data[prev..end];
            prev = end;
            arg
        })
    }

    /// Returns the argument at `idx`, if present.
    pub fn arg_idx(&self, idx: usize) -> Option<&[u8]> {
        let end = *self.args.get(idx)?;
        let start = match idx {
            0 => 0,
            _ => self.args[idx - 1],
        };
        Some(&self.data[start..end])
    }

    /// Number of arguments, the command name included.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Returns true if not even the command name was set.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Returns the packed command as a byte vector.
    #[inline]
    pub fn get_packed_command(&self) -> Vec<u8> {
        let mut cmd = Vec::new();
        self.write_packed_command(&mut cmd);
        cmd
    }

    pub(crate) fn write_packed_command(&self, cmd: &mut Vec<u8>) {
        let totlen = 1
            + countdigits(self.args.len())
            + 2
            + self.args_iter().map(|arg| bulklen(arg.len())).sum::<usize>();
        cmd.reserve(totlen);
        // writing into a Vec cannot fail
        let _ = write_command(cmd, self.args_iter());
    }
}

impl fmt::Debug for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for arg in self.args_iter() {
            list.entry(&String::from_utf8_lossy(arg));
        }
        list.finish()
    }
}

/// Shortcut function to creating a command with a single argument.
///
/// The first argument of a command is always the name of the command
/// which needs to be a string.
///
/// ```rust
/// respool::cmd("PING");
/// ```
pub fn cmd(name: &str) -> Cmd {
    let mut rv = Cmd::new();
    rv.arg(name);
    rv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_commands() {
        let packed = cmd("AUTH").arg("default").arg("secret").get_packed_command();
        assert_eq!(
            packed,
            b"*3\r\n$4\r\nAUTH\r\n$7\r\ndefault\r\n$6\r\nsecret\r\n".to_vec()
        );
    }

    #[test]
    fn integers_are_written_as_text() {
        let packed = cmd("SELECT").arg(12u16).get_packed_command();
        assert_eq!(packed, b"*2\r\n$6\r\nSELECT\r\n$2\r\n12\r\n".to_vec());
    }

    #[test]
    fn missing_optional_args_are_skipped() {
        let mut c = cmd("AUTH");
        c.arg(None::<&str>).arg("secret");
        assert_eq!(c.len(), 2);
        assert_eq!(c.arg_idx(1), Some(&b"secret"[..]));
        assert_eq!(c.arg_idx(2), None);
    }

    #[test]
    fn args_iter_splits_on_offsets() {
        let mut c = cmd("CLIENT");
        c.arg("REPLY").arg(b"").arg("ON");
        let args: Vec<_> = c.args_iter().collect();
        assert_eq!(args, vec![&b"CLIENT"[..], &b"REPLY"[..], &b""[..], &b"ON"[..]]);
        assert_eq!(format!("{c:?}"), r#"["CLIENT", "REPLY", "", "ON"]"#);
    }

    #[test]
    fn reserved_length_matches_output() {
        let c = cmd("CLIENT").arg("SETNAME").arg("x".repeat(12345)).clone();
        let mut out = Vec::new();
        c.write_packed_command(&mut out);
        assert_eq!(
            out.len(),
            1 + 1 + 2 + bulklen(6) + bulklen(7) + bulklen(12345)
        );
        assert!(out.starts_with(b"*3\r\n$6\r\nCLIENT\r\n"));
        assert!(out.ends_with(b"\r\n"));
    }
}
