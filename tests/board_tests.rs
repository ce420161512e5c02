//! Board tests - chain search, nuisance clearing and placement

use rand::rngs::StdRng;
use rand::SeedableRng;

use puyo_versus::core::{calculate_score, Board, PuyoRef};
use puyo_versus::types::{Gamemode, Settings, NUISANCE};

fn board(columns: Vec<Vec<u8>>) -> Board {
    Board::from_columns(&Settings::default(), columns)
}

#[test]
fn test_empty_board() {
    let b = Board::new(&Settings::default());
    assert_eq!(b.cols(), 6);
    assert_eq!(b.rows(), 12);
    assert!(b.is_empty());
    assert!(!b.check_game_over());
}

#[test]
fn test_three_is_not_a_group() {
    let mut b = board(vec![vec![1, 1, 1], vec![2]]);
    assert!(b.get_connections(4).is_empty());
    assert!(b.resolve_chains().is_empty());
    assert_eq!(b.count(), 4);
}

#[test]
fn test_two_link_chain() {
    // Colour 1 pops, letting colour 2 settle into a group of four.
    let mut b = board(vec![vec![2, 1, 1], vec![2, 1, 1, 2], vec![2]]);
    let steps = b.resolve_chains();

    assert_eq!(steps.len(), 2);
    assert!(steps[0].puyos.iter().all(|p| p.colour == 1));
    assert!(steps[1].puyos.iter().all(|p| p.colour == 2));
    assert_eq!(calculate_score(&steps[0].puyos, 1), 0);
    assert_eq!(calculate_score(&steps[1].puyos, 2), 320);
    assert!(b.is_empty());
}

#[test]
fn test_adjacent_nuisance_clears_with_group() {
    let mut b = board(vec![vec![1, 1, NUISANCE], vec![1, 1], vec![NUISANCE, NUISANCE]]);
    let steps = b.resolve_chains();

    assert_eq!(steps.len(), 1);
    let mut cleared: Vec<(usize, usize)> = steps[0].nuisance.iter().map(PuyoRef::loc).collect();
    cleared.sort_unstable();
    assert_eq!(cleared, vec![(0, 2), (2, 0), (2, 1)]);
    assert!(b.is_empty());
}

#[test]
fn test_distant_nuisance_survives() {
    let mut b = board(vec![vec![1, 1], vec![1, 1], vec![2], vec![NUISANCE]]);
    b.resolve_chains();
    assert_eq!(b.columns()[3], vec![NUISANCE]);
    assert_eq!(b.count(), 2);
}

#[test]
fn test_fever_checks_two_death_columns() {
    let fever = Settings {
        gamemode: Gamemode::Fever,
        ..Settings::default()
    };
    let mut columns = vec![Vec::new(); 6];
    columns[3] = vec![1; 12];

    assert!(Board::from_columns(&fever, columns.clone()).check_game_over());
    assert!(!board(columns).check_game_over());
}

#[test]
fn test_nuisance_rows_then_remainder() {
    let mut b = Board::new(&Settings::default());
    let mut rng = StdRng::seed_from_u64(42);

    let result = b.drop_nuisance(14, &mut rng);
    assert_eq!(result.dropped, 14);
    assert!((0..6).all(|c| (2..=3).contains(&b.height(c))));
    assert_eq!((0..6).filter(|&c| b.height(c) == 3).count(), 2);
    assert!(b.columns().iter().flatten().all(|&c| c == NUISANCE));
}

#[test]
fn test_nuisance_never_overfills_column() {
    let mut columns = vec![Vec::new(); 6];
    columns[0] = vec![1; 11];
    let mut b = board(columns);
    let mut rng = StdRng::seed_from_u64(3);

    b.drop_nuisance(30, &mut rng);
    assert_eq!(b.height(0), 13);
    assert_eq!(b.height(1), 5);
}
