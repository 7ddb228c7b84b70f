use rustsat_hsd::{
    hitman::{Hitman, McsAlgorithm, Params},
    types::Element,
    Error,
};
use rustsat_minisat::core::Minisat;

const SETS: [&[Element]; 3] = [&[1, 2, 3], &[1, 4], &[5, 6, 7]];

fn minimal_hitting_sets() -> Vec<Vec<Element>> {
    vec![
        vec![1, 5],
        vec![1, 6],
        vec![1, 7],
        vec![2, 4, 5],
        vec![2, 4, 6],
        vec![2, 4, 7],
        vec![3, 4, 5],
        vec![3, 4, 6],
        vec![3, 4, 7],
    ]
}

/// Enumerates until exhaustion and returns the sorted hitting sets with their
/// costs in the order they were found
fn enumerate_all(hitman: &mut Hitman<Minisat>) -> Vec<(Vec<Element>, usize)> {
    let mut found = vec![];
    loop {
        let mut hs = hitman.enumerate().unwrap();
        let Some(cost) = hitman.cost() else {
            assert!(hs.is_empty());
            break;
        };
        hs.sort_unstable();
        found.push((hs, cost));
        assert!(found.len() <= 20, "enumeration does not terminate");
    }
    found
}

fn hits_all(hs: &[Element]) -> bool {
    SETS.iter()
        .all(|set| set.iter().any(|el| hs.contains(el)))
}

#[test]
fn minimal_enumerates_all() {
    let mut hitman = Hitman::<Minisat>::minimal(Params::default());
    for set in SETS {
        hitman.hit(set).unwrap();
    }
    assert_eq!(hitman.n_vars(), 7);
    let found = enumerate_all(&mut hitman);
    for (hs, cost) in &found {
        assert!(hits_all(hs));
        assert_eq!(*cost, hs.len());
    }
    let mut sets: Vec<_> = found.into_iter().map(|(hs, _)| hs).collect();
    sets.sort();
    assert_eq!(sets, minimal_hitting_sets());
}

#[test]
fn minimal_clause_d() {
    let mut hitman = Hitman::<Minisat>::minimal(Params {
        clause_d: true,
        ..Params::default()
    });
    for set in SETS {
        hitman.hit(set).unwrap();
    }
    let mut sets: Vec<_> = enumerate_all(&mut hitman)
        .into_iter()
        .map(|(hs, _)| hs)
        .collect();
    sets.sort();
    assert_eq!(sets, minimal_hitting_sets());
}

#[test]
fn minimal_unsupported_algorithm() {
    for algorithm in [McsAlgorithm::Ucd, McsAlgorithm::Ubs, McsAlgorithm::Lopz] {
        let mut hitman = Hitman::<Minisat>::minimal(Params {
            algorithm,
            ..Params::default()
        });
        hitman.hit(&[1, 2]).unwrap();
        let err = hitman.get().unwrap_err();
        assert_eq!(
            err.downcast::<Error>().unwrap(),
            Error::UnsupportedAlgorithm(algorithm)
        );
    }
}

#[test]
fn minimum_enumerates_by_cost() {
    let mut hitman = Hitman::<Minisat>::minimum(Params::default());
    for set in SETS {
        hitman.hit(set).unwrap();
    }
    let found = enumerate_all(&mut hitman);
    assert_eq!(found[0].1, 2);
    for window in found.windows(2) {
        assert!(window[0].1 <= window[1].1);
    }
    for (hs, cost) in &found {
        assert!(hits_all(hs));
        assert_eq!(*cost, hs.len());
    }
    let mut sets: Vec<_> = found.into_iter().map(|(hs, _)| hs).collect();
    sets.sort();
    assert_eq!(sets, minimal_hitting_sets());
}

#[test]
fn minimum_trimming() {
    let mut hitman = Hitman::<Minisat>::minimum(Params {
        trim: 5,
        ..Params::default()
    });
    for set in SETS {
        hitman.hit(set).unwrap();
    }
    let found = enumerate_all(&mut hitman);
    assert_eq!(found.len(), 9);
    assert_eq!(found[0].1, 2);
    assert_eq!(found[8].1, 3);
}

#[test]
fn minimum_empty() {
    let mut hitman = Hitman::<Minisat>::minimum(Params::default());
    assert_eq!(hitman.get().unwrap(), Vec::<Element>::new());
    assert_eq!(hitman.cost(), Some(0));
    hitman.hit(&[]).unwrap();
    assert_eq!(hitman.n_vars(), 0);
}

#[test]
fn minimum_hard_clauses() {
    let mut hitman = Hitman::<Minisat>::minimum(Params::default());
    hitman.hit(&[1, 2]).unwrap();
    hitman.hit(&[1, 3]).unwrap();
    hitman.add_hard(&[-1]).unwrap();
    let mut hs = hitman.get().unwrap();
    hs.sort_unstable();
    assert_eq!(hs, vec![2, 3]);
    assert_eq!(hitman.cost(), Some(2));
}

#[test]
fn minimum_weighted() {
    let mut hitman = Hitman::<Minisat>::minimum(Params {
        trim: 2,
        one_call: true,
        ..Params::default()
    });
    hitman.weigh([(1, 5), (2, 3), (7, 4)]);
    // later weights of an element are ignored
    hitman.weigh([(2, 10)]);
    hitman.hit(&[1, 2]).unwrap();
    hitman.hit(&[2, 7]).unwrap();
    assert_eq!(hitman.enumerate().unwrap(), vec![2]);
    assert_eq!(hitman.cost(), Some(3));
    let mut hs = hitman.enumerate().unwrap();
    hs.sort_unstable();
    assert_eq!(hs, vec![1, 7]);
    assert_eq!(hitman.cost(), Some(9));
    hitman.enumerate().unwrap();
    assert_eq!(hitman.cost(), None);
}

#[test]
fn minimum_one_call() {
    let mut hitman = Hitman::<Minisat>::minimum(Params {
        one_call: true,
        ..Params::default()
    });
    hitman.hit(&[1, 2]).unwrap();
    let first = hitman.get().unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(hitman.cost(), Some(1));

    hitman.hit(&[3, 4]).unwrap();
    let calls = hitman.n_oracle_calls();
    let mut hs = hitman.get().unwrap();
    hs.sort_unstable();
    assert_eq!(hitman.cost(), Some(2));
    assert_eq!(hs.len(), 2);
    assert!(hs.contains(&first[0]));
    assert!(hs.contains(&3));
    // the unsat call that raised the bound, but no call for the extension
    assert_eq!(hitman.n_oracle_calls(), calls + 1);
}

#[test]
fn clear_resets() {
    let mut hitman = Hitman::<Minisat>::minimum(Params::default());
    hitman.hit(&[1]).unwrap();
    hitman.block(&[1]).unwrap();
    hitman.get().unwrap();
    assert_eq!(hitman.cost(), None);
    hitman.clear();
    assert_eq!(hitman.n_vars(), 0);
    hitman.hit(&[1]).unwrap();
    assert_eq!(hitman.get().unwrap(), vec![1]);
    assert_eq!(hitman.cost(), Some(1));
}

#[test]
fn add_soft() {
    let mut hitman = Hitman::<Minisat>::minimal(Params::default());
    hitman.add_soft(4);
    hitman.add_soft(4);
    assert_eq!(hitman.n_vars(), 1);
    hitman.add_hard(&[4]).unwrap();
    assert_eq!(hitman.get().unwrap(), vec![4]);
}

#[test]
fn enumerate_empty_family() {
    for mut hitman in [
        Hitman::<Minisat>::minimal(Params::default()),
        Hitman::<Minisat>::minimum(Params::default()),
    ] {
        assert_eq!(hitman.enumerate().unwrap(), Vec::<Element>::new());
        assert_eq!(hitman.cost(), Some(0));
        hitman.block(&[]).unwrap();
        hitman.add_hard(&[]).unwrap();
        hitman.hit(&[1, 2]).unwrap();
        let hs = hitman.enumerate().unwrap();
        assert_eq!(hs.len(), 1);
        assert_eq!(hitman.cost(), Some(1));
    }
}

#[test]
fn minimum_weighted_overlapping() {
    let weight = |el: &Element| match el {
        1 => 5,
        2 => 3,
        7 => 4,
        _ => 1,
    };
    for one_call in [false, true] {
        let mut hitman = Hitman::<Minisat>::minimum(Params {
            one_call,
            ..Params::default()
        });
        hitman.weigh([(1, 5), (2, 3), (7, 4)]);
        for set in SETS {
            hitman.hit(set).unwrap();
        }
        let found = enumerate_all(&mut hitman);
        let (first, cost) = &found[0];
        assert!(hits_all(first));
        assert_eq!(*cost, 3);
        assert_eq!(first.iter().map(weight).sum::<usize>(), 3);
        assert!([vec![3, 4, 5], vec![3, 4, 6]].contains(first));
        for window in found.windows(2) {
            assert!(window[0].1 <= window[1].1);
        }
        for (hs, cost) in &found {
            assert!(hits_all(hs));
            assert_eq!(*cost, hs.iter().map(weight).sum::<usize>());
        }
    }
}
