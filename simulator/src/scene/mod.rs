pub mod cone;
pub mod ray;
pub mod track;
