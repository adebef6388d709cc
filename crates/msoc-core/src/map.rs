//! Tile map: terrain, placed objects and neighbourhood queries

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::WorldConfig;
use crate::types::{Position, Resource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terrain {
    Grass,
    Stone,
    Flower,
}

impl Terrain {
    /// Weighted pick: 3/11 grass, 3/11 stone, 5/11 flower
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        match rng.gen_range(0..11) {
            r if r < 3 => Terrain::Grass,
            r if r < 6 => Terrain::Stone,
            _ => Terrain::Flower,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Tree,
    Rock,
    Bush,
    House,
    Market,
}

impl ObjectKind {
    /// Resource yielded by gathering this object, if any
    pub fn resource(self) -> Option<Resource> {
        match self {
            ObjectKind::Tree => Some(Resource::Wood),
            ObjectKind::Rock => Some(Resource::Stone),
            ObjectKind::Bush => Some(Resource::Bush),
            ObjectKind::House | ObjectKind::Market => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub terrain: Terrain,
    pub object: Option<ObjectKind>,
}

impl Tile {
    pub fn new(terrain: Terrain) -> Self {
        Self {
            terrain,
            object: None,
        }
    }

    pub fn has_object(&self) -> bool {
        self.object.is_some()
    }

    pub fn place_object(&mut self, kind: ObjectKind) {
        self.object = Some(kind);
    }

    pub fn remove_object(&mut self) -> Option<ObjectKind> {
        self.object.take()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileMap {
    width: i32,
    height: i32,
    tiles: Vec<Tile>,
}

impl TileMap {
    /// Empty grass map
    pub fn new(width: i32, height: i32) -> Self {
        let len = (width.max(0) * height.max(0)) as usize;
        Self {
            width,
            height,
            tiles: vec![Tile::new(Terrain::Grass); len],
        }
    }

    /// Random terrain with resource objects scattered at the configured densities
    pub fn generate<R: Rng + ?Sized>(config: &WorldConfig, rng: &mut R) -> Self {
        let mut map = Self::new(config.map_width, config.map_height);
        let tree = config.tree_density;
        let rock = tree + config.rock_density;
        let bush = rock + config.bush_density;
        for tile in &mut map.tiles {
            tile.terrain = Terrain::random(rng);
            let roll: f64 = rng.gen();
            tile.object = if roll < tree {
                Some(ObjectKind::Tree)
            } else if roll < rock {
                Some(ObjectKind::Rock)
            } else if roll < bush {
                Some(ObjectKind::Bush)
            } else {
                None
            };
        }
        map
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    fn index(&self, pos: Position) -> Option<usize> {
        self.in_bounds(pos)
            .then(|| (pos.y * self.width + pos.x) as usize)
    }

    pub fn get(&self, pos: Position) -> Option<&Tile> {
        self.index(pos).and_then(|i| self.tiles.get(i))
    }

    pub fn get_mut(&mut self, pos: Position) -> Option<&mut Tile> {
        self.index(pos).and_then(move |i| self.tiles.get_mut(i))
    }

    pub fn object_at(&self, pos: Position) -> Option<ObjectKind> {
        self.get(pos).and_then(|tile| tile.object)
    }

    fn neighbourhood(&self, pos: Position) -> impl Iterator<Item = Position> + '_ {
        (-1..=1).flat_map(move |dy| {
            (-1..=1)
                .map(move |dx| Position::new(pos.x + dx, pos.y + dy))
                .filter(move |p| self.in_bounds(*p))
        })
    }

    /// Objects of `kind` in the 3x3 block centred on `pos`
    pub fn count_nearby(&self, pos: Position, kind: ObjectKind) -> i32 {
        self.neighbourhood(pos)
            .filter(|p| self.object_at(*p) == Some(kind))
            .count() as i32
    }

    /// Object kinds in the 3x3 block, row-major
    pub fn scan_nearby(&self, pos: Position) -> Vec<ObjectKind> {
        self.neighbourhood(pos)
            .filter_map(|p| self.object_at(p))
            .collect()
    }

    pub fn find_nearest(&self, pos: Position, kind: ObjectKind) -> Option<Position> {
        self.positions()
            .filter(|p| self.object_at(*p) == Some(kind))
            .min_by_key(|p| p.manhattan(pos))
    }

    pub fn resource_count(&self, kind: ObjectKind) -> usize {
        self.tiles
            .iter()
            .filter(|tile| tile.object == Some(kind))
            .count()
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| Position::new(x, y)))
    }

    pub fn free_positions(&self) -> Vec<Position> {
        self.positions()
            .filter(|p| self.get(*p).is_some_and(|tile| !tile.has_object()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn create_test_map() -> TileMap {
        let mut map = TileMap::new(5, 5);
        map.get_mut(Position::new(1, 1)).unwrap().place_object(ObjectKind::Tree);
        map.get_mut(Position::new(2, 1)).unwrap().place_object(ObjectKind::Tree);
        map.get_mut(Position::new(0, 0)).unwrap().place_object(ObjectKind::Rock);
        map.get_mut(Position::new(4, 4)).unwrap().place_object(ObjectKind::Bush);
        map
    }

    #[test]
    fn test_count_nearby_includes_centre() {
        let map = create_test_map();
        assert_eq!(map.count_nearby(Position::new(1, 1), ObjectKind::Tree), 2);
        assert_eq!(map.count_nearby(Position::new(1, 1), ObjectKind::Rock), 1);
        assert_eq!(map.count_nearby(Position::new(3, 3), ObjectKind::Tree), 0);
    }

    #[test]
    fn test_count_nearby_at_corner() {
        let map = create_test_map();
        assert_eq!(map.count_nearby(Position::new(4, 4), ObjectKind::Bush), 1);
        assert_eq!(map.count_nearby(Position::new(0, 0), ObjectKind::Tree), 1);
    }

    #[test]
    fn test_scan_is_row_major() {
        let map = create_test_map();
        let kinds = map.scan_nearby(Position::new(1, 1));
        assert_eq!(kinds, vec![ObjectKind::Rock, ObjectKind::Tree, ObjectKind::Tree]);
    }

    #[test]
    fn test_find_nearest() {
        let map = create_test_map();
        assert_eq!(
            map.find_nearest(Position::new(4, 0), ObjectKind::Tree),
            Some(Position::new(2, 1))
        );
        assert_eq!(map.find_nearest(Position::new(0, 0), ObjectKind::Market), None);
    }

    #[test]
    fn test_out_of_bounds_lookup() {
        let map = create_test_map();
        assert!(map.get(Position::new(-1, 0)).is_none());
        assert!(map.get(Position::new(5, 0)).is_none());
        assert!(map.in_bounds(Position::new(4, 4)));
    }

    #[test]
    fn test_generate_is_deterministic() {
        let config = WorldConfig::default();
        let a = TileMap::generate(&config, &mut StdRng::seed_from_u64(7));
        let b = TileMap::generate(&config, &mut StdRng::seed_from_u64(7));
        assert_eq!(a.tiles, b.tiles);
        assert_eq!(a.tiles.len(), 625);
        assert!(a.resource_count(ObjectKind::Tree) > 0);
        assert_eq!(a.resource_count(ObjectKind::House), 0);
    }
}
