// src/notify.rs

//! Argument-less notifications and change-notifying collections.

use crate::asyncable::Asyncable;
use crate::channel::Channel;

use std::fmt;
use std::ops::Deref;

/// An argument-less broadcast: a thin facade over `Channel<()>`.
#[derive(Clone, Default)]
pub struct Notification {
  ch: Channel<()>,
}

impl Notification {
  /// Creates a notification with no listeners.
  pub fn new() -> Self {
    Notification {
      ch: Channel::new(),
    }
  }

  /// Fires the notification.
  pub fn notify(&self) {
    self.ch.send(());
  }

  /// Subscribes `callback` on the current thread.
  pub fn on_notify<F>(&self, owner: Option<&Asyncable>, callback: F)
  where
    F: Fn() + Send + 'static,
  {
    self.ch.on_receive(owner, move |_| callback());
  }

  /// Removes `owner`'s subscription.
  pub fn reset_on_notify(&self, owner: &Asyncable) {
    self.ch.disconnect(owner);
  }

  /// Signals the close sub-channel of the wrapped endpoint.
  pub fn close(&self) {
    self.ch.close();
  }

  /// Subscribes to the close signal.
  pub fn on_close<F>(&self, owner: Option<&Asyncable>, callback: F)
  where
    F: Fn() + Send + 'static,
  {
    self.ch.on_close(owner, callback);
  }

  /// True while anyone is listening.
  pub fn is_connected(&self) -> bool {
    self.ch.is_connected()
  }
}

impl fmt::Debug for Notification {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Notification")
      .field("connected", &self.is_connected())
      .finish()
  }
}

/// The bundle of change channels shared by a [`NotifyList`] and anyone
/// observing it. Cloning shares the underlying channels.
pub struct ChangedNotify<T: Clone + Send + 'static> {
  changed: Channel<()>,
  item_changed: Channel<T>,
  item_added: Channel<T>,
  item_removed: Channel<T>,
  item_replaced: Channel<(T, T)>,
}

impl<T: Clone + Send + 'static> ChangedNotify<T> {
  /// Creates an unobserved notify bundle.
  pub fn new() -> Self {
    ChangedNotify {
      changed: Channel::new(),
      item_changed: Channel::new(),
      item_added: Channel::new(),
      item_removed: Channel::new(),
      item_replaced: Channel::new(),
    }
  }

  /// Subscribes to any change of the observed collection.
  pub fn on_changed<F>(&self, owner: Option<&Asyncable>, callback: F)
  where
    F: Fn() + Send + 'static,
  {
    self.changed.on_receive(owner, move |_| callback());
  }

  /// Removes `owner`'s any-change subscription.
  pub fn reset_on_changed(&self, owner: &Asyncable) {
    self.changed.disconnect(owner);
  }

  /// Subscribes to in-place item mutations relayed by the collection.
  pub fn on_item_changed<F>(&self, owner: Option<&Asyncable>, callback: F)
  where
    F: Fn(&T) + Send + 'static,
  {
    self.item_changed.on_receive(owner, callback);
  }

  /// Removes `owner`'s item-changed subscription.
  pub fn reset_on_item_changed(&self, owner: &Asyncable) {
    self.item_changed.disconnect(owner);
  }

  /// Subscribes to item insertions.
  pub fn on_item_added<F>(&self, owner: Option<&Asyncable>, callback: F)
  where
    F: Fn(&T) + Send + 'static,
  {
    self.item_added.on_receive(owner, callback);
  }

  /// Removes `owner`'s item-added subscription.
  pub fn reset_on_item_added(&self, owner: &Asyncable) {
    self.item_added.disconnect(owner);
  }

  /// Subscribes to item removals.
  pub fn on_item_removed<F>(&self, owner: Option<&Asyncable>, callback: F)
  where
    F: Fn(&T) + Send + 'static,
  {
    self.item_removed.on_receive(owner, callback);
  }

  /// Removes `owner`'s item-removed subscription.
  pub fn reset_on_item_removed(&self, owner: &Asyncable) {
    self.item_removed.disconnect(owner);
  }

  /// Subscribes to item replacements with `(old, new)` pairs.
  pub fn on_item_replaced<F>(&self, owner: Option<&Asyncable>, callback: F)
  where
    F: Fn(&T, &T) + Send + 'static,
  {
    self
      .item_replaced
      .on_receive(owner, move |(old, new)| callback(old, new));
  }

  /// Removes `owner`'s item-replaced subscription.
  pub fn reset_on_item_replaced(&self, owner: &Asyncable) {
    self.item_replaced.disconnect(owner);
  }

  fn notify_changed(&self) {
    self.changed.send(());
  }
}

impl<T: Clone + Send + 'static> Clone for ChangedNotify<T> {
  fn clone(&self) -> Self {
    ChangedNotify {
      changed: self.changed.clone(),
      item_changed: self.item_changed.clone(),
      item_added: self.item_added.clone(),
      item_removed: self.item_removed.clone(),
      item_replaced: self.item_replaced.clone(),
    }
  }
}

impl<T: Clone + Send + 'static> Default for ChangedNotify<T> {
  fn default() -> Self {
    ChangedNotify::new()
  }
}

impl<T: Clone + Send + 'static> fmt::Debug for ChangedNotify<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ChangedNotify")
      .field("changed", &self.changed.is_connected())
      .field("item_changed", &self.item_changed.is_connected())
      .field("item_added", &self.item_added.is_connected())
      .field("item_removed", &self.item_removed.is_connected())
      .field("item_replaced", &self.item_replaced.is_connected())
      .finish()
  }
}

/// A value sequence whose mutations broadcast on a [`ChangedNotify`].
///
/// Every mutator fires the matching item channel and then the coarse
/// `changed` channel. Reads go through `Deref<Target = [T]>`.
pub struct NotifyList<T: Clone + Send + 'static> {
  items: Vec<T>,
  notify: ChangedNotify<T>,
}

impl<T: Clone + Send + 'static> NotifyList<T> {
  /// Creates an empty list.
  pub fn new() -> Self {
    NotifyList {
      items: Vec::new(),
      notify: ChangedNotify::new(),
    }
  }

  /// Creates a list over existing items.
  pub fn from_items(items: Vec<T>) -> Self {
    NotifyList {
      items,
      notify: ChangedNotify::new(),
    }
  }

  /// The shared notify bundle, for handing to observers.
  pub fn notify(&self) -> &ChangedNotify<T> {
    &self.notify
  }

  /// Appends an item; fires item-added and changed.
  pub fn push(&mut self, item: T) {
    self.items.push(item.clone());
    self.notify.item_added.send(item);
    self.notify.notify_changed();
  }

  /// Inserts an item at `index`; fires item-added and changed.
  pub fn insert(&mut self, index: usize, item: T) {
    self.items.insert(index, item.clone());
    self.notify.item_added.send(item);
    self.notify.notify_changed();
  }

  /// Removes and returns the item at `index` if it exists; fires
  /// item-removed and changed.
  pub fn remove_at(&mut self, index: usize) -> Option<T> {
    if index >= self.items.len() {
      return None;
    }
    let removed = self.items.remove(index);
    self.notify.item_removed.send(removed.clone());
    self.notify.notify_changed();
    Some(removed)
  }

  /// Replaces the item at `index`, returning the previous value; fires
  /// item-replaced with the `(old, new)` pair and changed.
  pub fn replace(&mut self, index: usize, item: T) -> T {
    let old = std::mem::replace(&mut self.items[index], item.clone());
    self.notify.item_replaced.send((old.clone(), item));
    self.notify.notify_changed();
    old
  }

  /// Replaces the whole content; fires changed only.
  pub fn set(&mut self, items: Vec<T>) {
    self.items = items;
    self.notify.notify_changed();
  }

  /// Removes every item; fires changed only.
  pub fn clear(&mut self) {
    self.items.clear();
    self.notify.notify_changed();
  }

  /// Relays an in-place mutation of `item` to item-changed observers.
  pub fn item_changed(&self, item: &T) {
    self.notify.item_changed.send(item.clone());
  }
}

impl<T: Clone + Send + 'static> Default for NotifyList<T> {
  fn default() -> Self {
    NotifyList::new()
  }
}

impl<T: Clone + Send + 'static> Deref for NotifyList<T> {
  type Target = [T];
  fn deref(&self) -> &[T] {
    &self.items
  }
}

impl<T: Clone + Send + 'static + fmt::Debug> fmt::Debug for NotifyList<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("NotifyList")
      .field("items", &self.items)
      .finish_non_exhaustive()
  }
}
