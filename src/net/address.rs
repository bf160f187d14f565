//! Socket endpoints across the IPv4, IPv6 and Unix-domain families.
//!
//! [`Address`] keeps the kernel's own `sockaddr_*` structure for each family,
//! so ports and IP addresses stay in network byte order internally and are
//! converted to host order only by the accessors. The same value can be passed
//! straight to `bind`/`connect`/`sendto` via [`Address::to_native`] and
//! rebuilt from what `accept`/`recvfrom` return via [`Address::from_native`].

use crate::error::{Result, SocketError};

use libc::{
    AF_INET, AF_INET6, AF_UNIX, SOCK_STREAM, addrinfo, c_char, c_int, sa_family_t, sockaddr,
    sockaddr_in, sockaddr_in6, sockaddr_storage, sockaddr_un, socklen_t,
};
use std::ffi::{CStr, CString, OsStr};
use std::fmt;
use std::io;
use std::mem;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr;

/// Protocol family of a socket or address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// IPv4 (`AF_INET`).
    Inet,
    /// IPv6 (`AF_INET6`).
    Inet6,
    /// Unix domain (`AF_UNIX`).
    Unix,
}

impl Family {
    pub fn as_raw(self) -> c_int {
        match self {
            Self::Inet => AF_INET,
            Self::Inet6 => AF_INET6,
            Self::Unix => AF_UNIX,
        }
    }

    pub fn from_raw(raw: c_int) -> Option<Self> {
        match raw {
            AF_INET => Some(Self::Inet),
            AF_INET6 => Some(Self::Inet6),
            AF_UNIX => Some(Self::Unix),
            _ => None,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet => write!(f, "AF_INET"),
            Self::Inet6 => write!(f, "AF_INET6"),
            Self::Unix => write!(f, "AF_UNIX"),
        }
    }
}

/// A socket endpoint in its native representation.
#[derive(Clone, Copy)]
pub enum Address {
    Ipv4(sockaddr_in),
    Ipv6(sockaddr_in6),
    Unix(sockaddr_un),
}

impl Address {
    /// Builds an IPv4 endpoint from host-order values.
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        let mut raw: sockaddr_in = unsafe { mem::zeroed() };

        #[cfg(any(
            target_vendor = "apple",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd",
            target_os = "dragonfly"
        ))]
        {
            raw.sin_len = mem::size_of::<sockaddr_in>() as u8;
        }

        raw.sin_family = AF_INET as sa_family_t;
        raw.sin_port = port.to_be();
        raw.sin_addr.s_addr = u32::from_ne_bytes(ip.octets());

        Self::Ipv4(raw)
    }

    /// Builds an IPv6 endpoint from host-order values.
    pub fn ipv6(ip: Ipv6Addr, port: u16, flowinfo: u32, scope_id: u32) -> Self {
        let mut raw: sockaddr_in6 = unsafe { mem::zeroed() };

        #[cfg(any(
            target_vendor = "apple",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd",
            target_os = "dragonfly"
        ))]
        {
            raw.sin6_len = mem::size_of::<sockaddr_in6>() as u8;
        }

        raw.sin6_family = AF_INET6 as sa_family_t;
        raw.sin6_port = port.to_be();
        raw.sin6_flowinfo = flowinfo;
        raw.sin6_addr.s6_addr = ip.octets();
        raw.sin6_scope_id = scope_id;

        Self::Ipv6(raw)
    }

    /// Builds a Unix-domain endpoint for a filesystem path.
    ///
    /// # Errors
    /// [`SocketError::InvalidArgument`] when the path (plus its NUL terminator)
    /// does not fit `sun_path`.
    pub fn unix(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = path.as_ref().as_os_str().as_bytes();
        let mut raw: sockaddr_un = unsafe { mem::zeroed() };

        if bytes.len() >= raw.sun_path.len() {
            return Err(SocketError::invalid_argument(format!(
                "unix socket path of {} bytes exceeds the {} byte limit",
                bytes.len(),
                raw.sun_path.len() - 1
            )));
        }

        #[cfg(any(
            target_vendor = "apple",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd",
            target_os = "dragonfly"
        ))]
        {
            raw.sun_len = mem::size_of::<sockaddr_un>() as u8;
        }

        raw.sun_family = AF_UNIX as sa_family_t;
        for (slot, &byte) in raw.sun_path.iter_mut().zip(bytes) {
            *slot = byte as c_char;
        }

        Ok(Self::Unix(raw))
    }

    /// The "any address" endpoint of `family` on `port`.
    pub fn wildcard(family: Family, port: u16) -> Result<Self> {
        match family {
            Family::Inet => Ok(Self::ipv4(Ipv4Addr::UNSPECIFIED, port)),
            Family::Inet6 => Ok(Self::ipv6(Ipv6Addr::UNSPECIFIED, port, 0, 0)),
            Family::Unix => Err(SocketError::invalid_argument(
                "unix sockets have no wildcard address; bind a path instead",
            )),
        }
    }

    /// Resolves `host` (numeric or name) and `port` to an address of `family`.
    ///
    /// For [`Family::Unix`] the host is taken as the socket path and `port` is
    /// ignored.
    ///
    /// # Errors
    /// [`SocketError::Resolution`] when the resolver fails or returns no entry
    /// of the requested family.
    pub fn from_host_port(host: &str, port: u16, family: Family) -> Result<Self> {
        if family == Family::Unix {
            return Self::unix(host);
        }

        let resolution_error = |detail: String| SocketError::Resolution {
            host: host.to_string(),
            port,
            detail,
        };

        let node = CString::new(host)
            .map_err(|_| resolution_error("host contains an interior NUL byte".into()))?;
        let service = CString::new(port.to_string())
            .map_err(|_| resolution_error("invalid port".into()))?;

        let mut hints: addrinfo = unsafe { mem::zeroed() };
        hints.ai_family = family.as_raw();
        hints.ai_socktype = SOCK_STREAM;

        let mut results: *mut addrinfo = ptr::null_mut();
        let status =
            unsafe { libc::getaddrinfo(node.as_ptr(), service.as_ptr(), &hints, &mut results) };

        if status != 0 {
            let detail = if status == libc::EAI_SYSTEM {
                io::Error::last_os_error().to_string()
            } else {
                unsafe { CStr::from_ptr(libc::gai_strerror(status)) }
                    .to_string_lossy()
                    .into_owned()
            };
            return Err(resolution_error(detail));
        }

        let mut found = None;
        let mut cursor = results;

        while !cursor.is_null() {
            let entry = unsafe { &*cursor };
            cursor = entry.ai_next;

            if entry.ai_addr.is_null() {
                continue;
            }

            let length = (entry.ai_addrlen as usize).min(mem::size_of::<sockaddr_storage>());
            let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
            unsafe {
                ptr::copy_nonoverlapping(
                    entry.ai_addr as *const u8,
                    &mut storage as *mut sockaddr_storage as *mut u8,
                    length,
                );
            }

            if let Some(address) = Self::from_native(&storage, length as socklen_t) {
                if address.family() == family {
                    found = Some(address);
                    break;
                }
            }
        }

        unsafe { libc::freeaddrinfo(results) };

        found.ok_or_else(|| resolution_error(format!("no {family} address found")))
    }

    /// Serializes into a `sockaddr_storage` and the length matching the variant.
    pub fn to_native(&self) -> (sockaddr_storage, socklen_t) {
        let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

        let length = match self {
            Self::Ipv4(raw) => copy_into(&mut storage, raw),
            Self::Ipv6(raw) => copy_into(&mut storage, raw),
            Self::Unix(raw) => copy_into(&mut storage, raw),
        };

        (storage, length)
    }

    /// Rebuilds an address from what the kernel wrote into `storage`.
    ///
    /// Returns `None` when the family is not one of IPv4/IPv6/Unix or the
    /// length is too short for it. Callers should treat that as "address not
    /// representable", not as a failure of the call that produced it.
    pub fn from_native(storage: &sockaddr_storage, length: socklen_t) -> Option<Self> {
        let length = length as usize;
        if length < mem::size_of::<sa_family_t>() {
            return None;
        }

        let base = storage as *const sockaddr_storage;

        match Family::from_raw(storage.ss_family as c_int)? {
            Family::Inet if length >= mem::size_of::<sockaddr_in>() => {
                Some(Self::Ipv4(unsafe { ptr::read(base as *const sockaddr_in) }))
            }
            Family::Inet6 if length >= mem::size_of::<sockaddr_in6>() => {
                Some(Self::Ipv6(unsafe { ptr::read(base as *const sockaddr_in6) }))
            }
            Family::Unix => Some(Self::Unix(unsafe { ptr::read(base as *const sockaddr_un) })),
            _ => None,
        }
    }

    /// Calls `body` with a `sockaddr` pointer and length for this address.
    pub(crate) fn with_sockaddr<R>(&self, body: impl FnOnce(*const sockaddr, socklen_t) -> R) -> R {
        let (storage, length) = self.to_native();
        body(&storage as *const sockaddr_storage as *const sockaddr, length)
    }

    pub fn family(&self) -> Family {
        match self {
            Self::Ipv4(_) => Family::Inet,
            Self::Ipv6(_) => Family::Inet6,
            Self::Unix(_) => Family::Unix,
        }
    }

    /// Port in host byte order; `None` for Unix-domain addresses.
    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Ipv4(raw) => Some(u16::from_be(raw.sin_port)),
            Self::Ipv6(raw) => Some(u16::from_be(raw.sin6_port)),
            Self::Unix(_) => None,
        }
    }

    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            Self::Ipv4(raw) => Some(IpAddr::V4(Ipv4Addr::from(
                raw.sin_addr.s_addr.to_ne_bytes(),
            ))),
            Self::Ipv6(raw) => Some(IpAddr::V6(Ipv6Addr::from(raw.sin6_addr.s6_addr))),
            Self::Unix(_) => None,
        }
    }

    /// Filesystem path of a Unix-domain address; `None` for IP addresses and
    /// for unnamed Unix sockets.
    pub fn path(&self) -> Option<PathBuf> {
        match self {
            Self::Unix(raw) => {
                let bytes: Vec<u8> = raw
                    .sun_path
                    .iter()
                    .take_while(|&&byte| byte != 0)
                    .map(|&byte| byte as u8)
                    .collect();

                if bytes.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(OsStr::from_bytes(&bytes)))
                }
            }
            _ => None,
        }
    }

    /// Printable host part: the IP address, or the path for Unix addresses.
    pub fn hostname(&self) -> String {
        match (self.ip(), self.path()) {
            (Some(ip), _) => ip.to_string(),
            (None, Some(path)) => path.display().to_string(),
            (None, None) => String::new(),
        }
    }

    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Ipv4(raw) => Some(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::from(raw.sin_addr.s_addr.to_ne_bytes()),
                u16::from_be(raw.sin_port),
            ))),
            Self::Ipv6(raw) => Some(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(raw.sin6_addr.s6_addr),
                u16::from_be(raw.sin6_port),
                raw.sin6_flowinfo,
                raw.sin6_scope_id,
            ))),
            Self::Unix(_) => None,
        }
    }
}

fn copy_into<T>(storage: &mut sockaddr_storage, raw: &T) -> socklen_t {
    let length = mem::size_of::<T>();
    unsafe {
        ptr::copy_nonoverlapping(
            raw as *const T as *const u8,
            storage as *mut sockaddr_storage as *mut u8,
            length,
        );
    }
    length as socklen_t
}

impl From<SocketAddr> for Address {
    fn from(address: SocketAddr) -> Self {
        match address {
            SocketAddr::V4(v4) => Self::ipv4(*v4.ip(), v4.port()),
            SocketAddr::V6(v6) => Self::ipv6(*v6.ip(), v6.port(), v6.flowinfo(), v6.scope_id()),
        }
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unix(_), Self::Unix(_)) => self.path() == other.path(),
            (Self::Unix(_), _) | (_, Self::Unix(_)) => false,
            _ => self.to_socket_addr() == other.to_socket_addr(),
        }
    }
}

impl Eq for Address {}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_socket_addr() {
            Some(address) => write!(f, "{address}"),
            None => match self.path() {
                Some(path) => write!(f, "unix:{}", path.display()),
                None => write!(f, "unix:(unnamed)"),
            },
        }
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}
