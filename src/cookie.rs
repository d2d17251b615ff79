//! Cookie jar contract consumed by the signer and dispatcher, plus an in-memory jar.

// self
use crate::_prelude::*;

/// Storage for server-issued cookies shared by every chain of a session.
pub trait CookieStore
where
	Self: Send + Sync,
{
	/// Renders the `Cookie` request header; an empty string means "send no header".
	fn cookie_header(&self) -> String;

	/// Persists the raw `Set-Cookie` values of a successful response.
	fn store_cookies(&self, set_cookie: &[&str]);
}

/// Thread-safe jar keeping `name=value` pairs in memory, ordered by name.
#[derive(Clone, Debug, Default)]
pub struct MemoryCookieStore(Arc<RwLock<BTreeMap<String, String>>>);
impl MemoryCookieStore {
	/// Returns the stored value for `name`, if any.
	pub fn get(&self, name: &str) -> Option<String> {
		self.0.read().get(name).cloned()
	}

	/// Number of stored cookies.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no cookie is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Drops every stored cookie.
	pub fn clear(&self) {
		self.0.write().clear();
	}

	fn parse(raw: &str) -> Option<(String, String, bool)> {
		let mut parts = raw.split(';');
		let (name, value) = parts.next()?.split_once('=')?;
		let name = name.trim();

		if name.is_empty() {
			return None;
		}

		let expired = parts.filter_map(|attr| attr.split_once('=')).any(|(key, value)| {
			key.trim().eq_ignore_ascii_case("max-age")
				&& value.trim().parse::<i64>().is_ok_and(|age| age <= 0)
		});

		Some((name.to_owned(), value.trim().to_owned(), expired))
	}
}
impl CookieStore for MemoryCookieStore {
	fn cookie_header(&self) -> String {
		let jar = self.0.read();
		let mut buf = String::new();

		for (idx, (name, value)) in jar.iter().enumerate() {
			if idx > 0 {
				buf.push_str("; ");
			}

			buf.push_str(name);
			buf.push('=');
			buf.push_str(value);
		}

		buf
	}

	fn store_cookies(&self, set_cookie: &[&str]) {
		let mut jar = self.0.write();

		for (name, value, expired) in set_cookie.iter().filter_map(|raw| Self::parse(raw)) {
			if expired {
				jar.remove(&name);
			} else {
				jar.insert(name, value);
			}
		}
	}
}
