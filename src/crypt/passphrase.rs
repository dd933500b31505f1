//! Locked, zeroized passphrase storage with a deploy/undeploy window.
//!
//! Passphrases are held in locked, zeroed-on-drop buffers. A
//! deploy/undeploy pair narrows their plaintext lifetime to the minimum
//! window around a cryptographic call. [`Passphrase::deploy`] is that
//! narrowing: the plaintext is only ever exposed inside the closure passed
//! to it, never as a returned reference the caller could hold past the
//! call.

use zeroize::Zeroizing;

pub struct Passphrase {
    inner: Zeroizing<String>,
}

impl Passphrase {
    pub fn new(plaintext: impl Into<String>) -> Self {
        Self { inner: Zeroizing::new(plaintext.into()) }
    }

    /// Expose the plaintext to `f` for the minimum necessary window, then
    /// let it go out of scope. This is the "deploy" half of the
    /// deploy/undeploy pair; "undeploy" is implicit — there is nothing to
    /// explicitly undo because the reference never escapes `f`.
    pub fn deploy<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        f(&self.inner)
    }

    /// An explicit clone, used only when a second independent owner is
    /// genuinely required (e.g. handing a copy to a background retry).
    /// Cloning is never implicit.
    pub fn clone_into_fresh_buffer(&self) -> Passphrase {
        self.deploy(|s| Passphrase::new(s.to_owned()))
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_exposes_plaintext_only_inside_closure() {
        let p = Passphrase::new("s3cr3t");
        let len = p.deploy(|s| s.len());
        assert_eq!(len, 6);
    }

    #[test]
    fn debug_never_prints_plaintext() {
        let p = Passphrase::new("s3cr3t");
        assert!(!format!("{p:?}").contains("s3cr3t"));
    }
}
