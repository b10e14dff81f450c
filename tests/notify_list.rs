use weft::{Asyncable, NotifyList};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[test]
fn push_fires_item_added_and_changed() {
  let mut list = NotifyList::<i32>::new();
  let added = Arc::new(Mutex::new(Vec::new()));
  let changed = Arc::new(AtomicUsize::new(0));

  let a = added.clone();
  list.notify().on_item_added(None, move |v| a.lock().unwrap().push(*v));
  let c = changed.clone();
  list.notify().on_changed(None, move || {
    c.fetch_add(1, Ordering::SeqCst);
  });

  list.push(10);
  list.push(20);

  assert_eq!(*added.lock().unwrap(), vec![10, 20]);
  assert_eq!(changed.load(Ordering::SeqCst), 2);
  assert_eq!(&*list, &[10, 20]);
}

#[test]
fn remove_fires_item_removed() {
  let mut list = NotifyList::from_items(vec![1, 2, 3]);
  let removed = Arc::new(Mutex::new(Vec::new()));

  let r = removed.clone();
  list
    .notify()
    .on_item_removed(None, move |v| r.lock().unwrap().push(*v));

  assert_eq!(list.remove_at(1), Some(2));
  assert_eq!(list.remove_at(9), None);

  assert_eq!(*removed.lock().unwrap(), vec![2]);
  assert_eq!(&*list, &[1, 3]);
}

#[test]
fn replace_fires_item_replaced_with_old_and_new() {
  let mut list = NotifyList::from_items(vec!["do", "re", "mi"]);
  let replaced = Arc::new(Mutex::new(Vec::new()));

  let r = replaced.clone();
  list.notify().on_item_replaced(None, move |old, new| {
    r.lock().unwrap().push((*old, *new));
  });

  let old = list.replace(1, "fa");
  assert_eq!(old, "re");
  assert_eq!(*replaced.lock().unwrap(), vec![("re", "fa")]);
  assert_eq!(&*list, &["do", "fa", "mi"]);
}

#[test]
fn set_and_clear_fire_changed_only() {
  let mut list = NotifyList::<i32>::new();
  let changed = Arc::new(AtomicUsize::new(0));
  let added = Arc::new(AtomicUsize::new(0));

  let c = changed.clone();
  list.notify().on_changed(None, move || {
    c.fetch_add(1, Ordering::SeqCst);
  });
  let a = added.clone();
  list.notify().on_item_added(None, move |_| {
    a.fetch_add(1, Ordering::SeqCst);
  });

  list.set(vec![1, 2, 3]);
  list.clear();

  assert_eq!(changed.load(Ordering::SeqCst), 2);
  assert_eq!(added.load(Ordering::SeqCst), 0);
  assert!(list.is_empty());
}

#[test]
fn item_changed_relays_in_place_mutations() {
  let list = NotifyList::from_items(vec![5]);
  let seen = Arc::new(Mutex::new(Vec::new()));

  let s = seen.clone();
  list
    .notify()
    .on_item_changed(None, move |v| s.lock().unwrap().push(*v));

  list.item_changed(&list[0]);
  assert_eq!(*seen.lock().unwrap(), vec![5]);
}

#[test]
fn observer_drop_detaches_from_the_list() {
  let mut list = NotifyList::<i32>::new();
  let counted = Arc::new(AtomicUsize::new(0));

  {
    let anchor = Asyncable::new();
    let c = counted.clone();
    list.notify().on_changed(Some(&anchor), move || {
      c.fetch_add(1, Ordering::SeqCst);
    });

    list.push(1);
    assert_eq!(counted.load(Ordering::SeqCst), 1);
  }

  list.push(2);
  assert_eq!(counted.load(Ordering::SeqCst), 1);
}
