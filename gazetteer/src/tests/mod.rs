mod geocoder;
mod locality_index;
mod regions;
mod streets;
